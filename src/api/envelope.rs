use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use chrono::{DateTime, Local, TimeZone};
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

/// Name and address of the serving host, resolved once per process
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub name: String,
    pub ip: String,
}

static HOST: Lazy<HostInfo> = Lazy::new(HostInfo::detect);

impl HostInfo {
    pub fn current() -> &'static HostInfo {
        &HOST
    }

    fn detect() -> Self {
        let name = std::env::var("HOSTNAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| "localhost".to_string());

        let ip = (name.as_str(), 0)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.find(|a| a.is_ipv4()).map(|a| a.ip()))
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .to_string();

        Self { name, ip }
    }
}

/// `yyyyMMddHHmmss` as an integer, suffixed with three zero digits
pub fn server_time<Tz: TimeZone>(at: &DateTime<Tz>) -> i64
where
    Tz::Offset: std::fmt::Display,
{
    let stamp: i64 = at.format("%Y%m%d%H%M%S").to_string().parse().unwrap_or(0);
    stamp * 1000
}

/// Standard response body shared by every error path
pub fn envelope(code: u16, message: &str, extra: Option<&Map<String, Value>>) -> Value {
    let host = HostInfo::current();
    let mut body = json!({
        "code": code,
        "message": message,
        "server_time": server_time(&Local::now()),
        "host_name": host.name,
        "host_ip": host.ip,
    });
    if let (Some(extra), Some(obj)) = (extra, body.as_object_mut()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    body
}
