use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{FilterOrderInfo, SortDirection, SortSpec};

pub struct FilterOrder;

impl FilterOrder {
    /// Parse `"field asc,other desc"`. Every comma-separated token must be
    /// exactly `<field> <asc|desc>` separated by one space; anything else
    /// rejects the whole string.
    pub fn parse(orderby: &str) -> Result<SortSpec, FilterError> {
        if orderby.is_empty() {
            return Ok(SortSpec::default());
        }

        let mut out = Vec::new();
        for token in orderby.split(',') {
            let parts: Vec<&str> = token.split(' ').collect();
            let sort = match parts.as_slice() {
                [field, "asc"] if !field.trim().is_empty() => SortDirection::Asc,
                [field, "desc"] if !field.trim().is_empty() => SortDirection::Desc,
                _ => return Err(FilterError::InvalidSort(orderby.to_string())),
            };
            out.push(FilterOrderInfo { field: parts[0].to_string(), sort });
        }
        Ok(SortSpec(out))
    }

    /// `ORDER BY` over JSONB paths, binding each path through `sql`
    pub fn generate(spec: &SortSpec, sql: &mut FilterWhere) -> String {
        if spec.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = spec
            .keys()
            .iter()
            .map(|info| format!("{} {}", sql.path(&info.field), info.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_keys_in_order() {
        let spec = FilterOrder::parse("age asc,name desc").unwrap();
        assert_eq!(
            spec.keys(),
            &[
                FilterOrderInfo { field: "age".into(), sort: SortDirection::Asc },
                FilterOrderInfo { field: "name".into(), sort: SortDirection::Desc },
            ]
        );
    }

    #[test]
    fn empty_means_natural_order() {
        assert!(FilterOrder::parse("").unwrap().is_empty());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for raw in ["age up", "age", "age asc, name desc", " asc", "age  asc", "age ASC", "   "] {
            let err = FilterOrder::parse(raw).unwrap_err();
            assert_eq!(err, FilterError::InvalidSort(raw.to_string()), "{:?}", raw);
        }
    }

    #[test]
    fn generates_bound_order_clause() {
        let mut sql = FilterWhere::new();
        let spec = FilterOrder::parse("age asc,name desc").unwrap();
        let clause = FilterOrder::generate(&spec, &mut sql);
        assert_eq!(clause, "ORDER BY (data #> $1::text[]) ASC, (data #> $2::text[]) DESC");
        assert_eq!(sql.params().len(), 2);
    }
}
