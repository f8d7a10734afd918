use crate::from_env_var;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use strum::{EnumString, VariantNames};

from_env_var!(
    /// The current environment, which controls what file to read other ENV vars from
    let name = Env;
    let default: EnvInner = EnvInner::Development;
    let (env_var, allowed_values) = ("RUST_ENV", format!("one of: {:?}", EnvInner::VARIANTS));
    let from_str = |s| EnvInner::from_str(s).ok();
);

from_env_var!(
    /// The address to run the broker on
    let name = BrokerAddr;
    let default: IpAddr = IpAddr::V4("127.0.0.1".parse().expect("hardcoded"));
    let (env_var, allowed_values) = ("BIND", "a valid address (e.g., 127.0.0.1)");
    let from_str = |s| s.parse().ok();
);

from_env_var!(
    /// How verbosely the broker should log messages
    let name = LogLevel;
    let default: LogLevelInner = LogLevelInner::Warn;
    let (env_var, allowed_values) = ("RUST_LOG", format!("one of: {:?}", LogLevelInner::VARIANTS));
    let from_str = |s| LogLevelInner::from_str(s).ok();
);

from_env_var!(
    /// The port to run the broker on
    let name = Port;
    let default: u16 = 4000;
    let (env_var, allowed_values) = ("PORT", "a number between 0 and 65535");
    let from_str = |s| s.parse().ok();
);

#[derive(EnumString, VariantNames, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum EnvInner {
    Production,
    Development,
}

#[derive(EnumString, VariantNames, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum LogLevelInner {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Permissions for Cross Origin Resource Sharing (CORS)
#[derive(Clone)]
pub struct Cors<'a> {
    pub allowed_headers: Vec<&'a str>,
    pub allowed_methods: Vec<&'a str>,
}
impl fmt::Debug for Cors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allowed headers: {:?}\n      allowed methods: {:?}",
            self.allowed_headers, self.allowed_methods
        )
    }
}
impl std::default::Default for Cors<'_> {
    fn default() -> Self {
        Self {
            allowed_methods: vec!["GET", "POST", "OPTIONS"],
            allowed_headers: vec![
                "Authorization",
                "Accept",
                "Cache-Control",
                "Content-Type",
                "X-User-Id",
                "X-Realm-Id",
            ],
        }
    }
}
