use serde_json::{json, Value};

use super::dates::date_millis;
use super::error::FilterError;
use super::types::{FilterOp, FilterSpec, FilterValue, IdPredicate, SqlParam};

/// Translates a `FilterSpec` into a Postgres predicate over a collection
/// table of `(id uuid, data jsonb)`. Parameters are numbered in the order
/// they are pushed, so one builder can serve a whole statement.
#[derive(Debug, Default)]
pub struct FilterWhere {
    params: Vec<SqlParam>,
}

impl FilterWhere {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }

    pub fn param(&mut self, value: SqlParam) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    /// JSONB value at a (possibly dotted) field path of `data`
    pub fn path(&mut self, field: &str) -> String {
        self.path_of("data", field)
    }

    pub fn path_of(&mut self, column: &str, field: &str) -> String {
        let parts = field.split('.').map(str::to_string).collect();
        let p = self.param(SqlParam::Path(parts));
        format!("({} #> {}::text[])", column, p)
    }

    /// Conditions joined with AND; an empty spec matches everything
    pub fn generate(&mut self, spec: &FilterSpec) -> Result<String, FilterError> {
        let mut conditions = Vec::new();

        for predicate in spec.ids() {
            conditions.push(self.id_condition(predicate));
        }

        for (field, value) in spec.fields() {
            let path = self.path(field);
            let condition = match value {
                FilterValue::Literal(v) => self.literal(&path, v),
                FilterValue::AnyOf(items) => self.any_of(&path, items),
                FilterValue::RegexMatch(pattern) => self.regex(&path, pattern),
                FilterValue::Operator(ops) => {
                    let mut parts = Vec::with_capacity(ops.len());
                    for (op, operand) in ops {
                        parts.push(self.operator(&path, *op, operand)?);
                    }
                    parts.join(" AND ")
                }
            };
            conditions.push(condition);
        }

        if conditions.is_empty() {
            Ok("TRUE".to_string())
        } else {
            Ok(conditions.join(" AND "))
        }
    }

    fn id_condition(&mut self, predicate: &IdPredicate) -> String {
        match predicate {
            IdPredicate::Eq(id) => format!("id = {}", self.param(SqlParam::Uuid(*id))),
            IdPredicate::Ne(id) => format!("id <> {}", self.param(SqlParam::Uuid(*id))),
            IdPredicate::In(ids) => format!("id = ANY({})", self.param(SqlParam::UuidList(ids.clone()))),
            IdPredicate::Nin(ids) => format!("NOT (id = ANY({}))", self.param(SqlParam::UuidList(ids.clone()))),
        }
    }

    fn literal(&mut self, path: &str, value: &Value) -> String {
        if value.is_null() {
            return format!("({p} IS NULL OR {p} = 'null'::jsonb)", p = path);
        }
        let v = self.param(SqlParam::Json(value.clone()));
        let wrapped = self.param(SqlParam::Json(json!([value])));
        format!(
            "({p} = {v}::jsonb OR (jsonb_typeof({p}) = 'array' AND {p} @> {w}::jsonb))",
            p = path,
            v = v,
            w = wrapped
        )
    }

    fn any_of(&mut self, path: &str, items: &[Value]) -> String {
        let list = self.param(SqlParam::Json(Value::Array(items.to_vec())));
        format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements(CASE WHEN jsonb_typeof({p}) = 'array' THEN {p} ELSE '[]'::jsonb END) AS e(v) \
             WHERE e.v IN (SELECT jsonb_array_elements({l}::jsonb)))",
            p = path,
            l = list
        )
    }

    fn regex(&mut self, path: &str, pattern: &str) -> String {
        let pat = self.param(SqlParam::Text(pattern.to_string()));
        format!("(jsonb_typeof({p}) = 'string' AND ({p} #>> '{{}}') ~ {r})", p = path, r = pat)
    }

    fn in_list(&mut self, path: &str, operand: &Value) -> String {
        let list = self.param(SqlParam::Json(operand.clone()));
        format!(
            "EXISTS (SELECT 1 FROM jsonb_array_elements({l}::jsonb) AS c(v) \
             WHERE {p} = c.v OR (jsonb_typeof({p}) = 'array' AND {p} @> jsonb_build_array(c.v)))",
            p = path,
            l = list
        )
    }

    fn operator(&mut self, path: &str, op: FilterOp, operand: &Value) -> Result<String, FilterError> {
        Ok(match op {
            FilterOp::Eq => self.literal(path, operand),
            FilterOp::Ne => format!("NOT COALESCE({}, false)", self.literal(path, operand)),
            FilterOp::In => self.in_list(path, operand),
            FilterOp::Nin => format!("NOT {}", self.in_list(path, operand)),
            FilterOp::Exists => {
                if truthy(operand) {
                    format!("{} IS NOT NULL", path)
                } else {
                    format!("{} IS NULL", path)
                }
            }
            FilterOp::Regex => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| FilterError::InvalidOperatorData("$regex requires string".to_string()))?;
                self.regex(path, pattern)
            }
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => self.compare(path, op, operand)?,
        })
    }

    fn compare(&mut self, path: &str, op: FilterOp, operand: &Value) -> Result<String, FilterError> {
        let sql_op = match op {
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            _ => "<=",
        };

        if let Some(millis) = date_millis(operand) {
            let p = self.param(SqlParam::BigInt(millis));
            return Ok(format!(
                "CASE WHEN jsonb_typeof({path} -> '$date') = 'number' THEN ({path} ->> '$date')::bigint {op} {p} ELSE false END",
                path = path,
                op = sql_op,
                p = p
            ));
        }

        match operand {
            Value::Number(n) => {
                let p = self.param(SqlParam::Float(n.as_f64().unwrap_or(0.0)));
                Ok(format!(
                    "CASE WHEN jsonb_typeof({path}) = 'number' THEN ({path} #>> '{{}}')::float8 {op} {p} ELSE false END",
                    path = path,
                    op = sql_op,
                    p = p
                ))
            }
            Value::String(s) => {
                let p = self.param(SqlParam::Text(s.clone()));
                Ok(format!(
                    "CASE WHEN jsonb_typeof({path}) = 'string' THEN ({path} #>> '{{}}') {op} {p} ELSE false END",
                    path = path,
                    op = sql_op,
                    p = p
                ))
            }
            other => Err(FilterError::InvalidOperatorData(format!(
                "{} cannot compare against {}",
                op.as_str(),
                other
            ))),
        }
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}
