use hashbrown::HashMap;
use std::fmt;

#[derive(Debug, Clone)]
pub(crate) struct EnvVar(pub HashMap<String, String>);
impl std::ops::Deref for EnvVar {
    type Target = HashMap<String, String>;
    fn deref(&self) -> &HashMap<String, String> {
        &self.0
    }
}

impl EnvVar {
    pub(crate) fn new(vars: HashMap<String, String>) -> Self {
        Self(vars)
    }

    pub(crate) fn maybe_add_env_var(&mut self, key: &str, maybe_value: Option<impl ToString>) {
        if let Some(value) = maybe_value {
            self.0.insert(key.to_string(), value.to_string());
        }
    }

    /// Expand `DATABASE_URL` into the individual `DB_*` variables.  Variables set
    /// explicitly take precedence over the values in the URL.
    pub(crate) fn update_with_postgres_url(
        mut self,
        url_str: &str,
    ) -> Result<Self, crate::err::FatalErr> {
        let url = url::Url::parse(url_str)?;
        let none_if_empty = |s: String| if s.is_empty() { None } else { Some(s) };

        let user = none_if_empty(url.username().to_string());
        let host = url.host_str().map(String::from);
        let port = url.port().map(|port| port.to_string());
        let db_name = none_if_empty(url.path().trim_start_matches('/').to_string());
        let password = match url.password() {
            Some(pass) => Some(urlencoding::decode(pass)?.into_owned()),
            None => None,
        };
        let ssl_mode = url
            .query_pairs()
            .find(|(key, _val)| key == "sslmode")
            .map(|(_key, val)| val.to_string());

        for (var, value) in [
            ("DB_USER", user),
            ("DB_HOST", host),
            ("DB_PORT", port),
            ("DB_NAME", db_name),
            ("DB_PASS", password),
            ("DB_SSLMODE", ssl_mode),
        ] {
            if !self.contains_key(var) {
                self.maybe_add_env_var(var, value);
            }
        }
        Ok(self)
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = String::new();
        for env_var in &[
            "RUST_ENV",
            "RUST_LOG",
            "BIND",
            "PORT",
            "DATABASE_URL",
            "DB_USER",
            "DB_PORT",
            "DB_HOST",
            "DB_NAME",
            "DB_SSLMODE",
            "MTABLE_SIZE",
            "QUEUE_TIMEOUT",
            "GC_INTERVAL",
            "MESSAGE_CACHE_SIZE",
        ] {
            if let Some(value) = self.get(&(*env_var).to_string()) {
                result = format!("{}\n    {}: {}", result, env_var, value)
            }
        }
        if self.contains_key("DB_PASS") {
            result = format!("{}\n    DB_PASS: <redacted>", result);
        }
        if self.contains_key("SHARED_SECRET") {
            result = format!("{}\n    SHARED_SECRET: <redacted>", result);
        }
        write!(f, "{}", result)
    }
}

#[macro_export]
macro_rules! from_env_var {
    ($(#[$outer:meta])*
     let name = $name:ident;
     let default: $type:ty = $inner:expr;
     let (env_var, allowed_values) = ($env_var:tt, $allowed_values:expr);
     let from_str = |$arg:ident| $body:expr;
    ) => {
        $(#[$outer])*
        #[derive(Clone)]
        pub struct $name(pub $type);
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }
        impl std::ops::Deref for $name {
            type Target = $type;
            fn deref(&self) -> &$type {
                &self.0
            }
        }
        impl std::default::Default for $name {
            fn default() -> Self {
                $name($inner)
            }
        }
        impl $name {
            fn inner_from_str($arg: &str) -> Option<$type> {
                $body
            }
            pub(crate) fn maybe_update(
                self,
                var: Option<&String>,
            ) -> Result<Self, crate::err::FatalErr> {
                Ok(match var {
                    Some(empty_string) if empty_string.is_empty() => Self::default(),
                    Some(value) => Self(Self::inner_from_str(value).ok_or_else(|| {
                        crate::err::FatalErr::config($env_var, value, $allowed_values)
                    })?),
                    None => self,
                })
            }
        }
    };
}
