use crate::from_env_var;
use std::str::FromStr;
use strum::{EnumString, VariantNames};

from_env_var!(
    /// The role the broker reads message history as; it never writes
    let name = PgUser;
    let default: String = "zulip".to_string();
    let (env_var, allowed_values) = ("DB_USER", "any role name");
    let from_str = |s| Some(s.to_string());
);

from_env_var!(
    /// Host name, IP address, or (starting with `/`) the directory of the server's socket
    let name = PgHost;
    let default: String = "localhost".to_string();
    let (env_var, allowed_values) = ("DB_HOST", "a host name, address, or socket directory");
    let from_str = |s| Some(s.to_string());
);

from_env_var!(
    /// Password for `DB_USER`; peer or trust auth needs none
    let name = PgPass;
    let default: Option<String> = None;
    let (env_var, allowed_values) = ("DB_PASS", "any string");
    let from_str = |s| Some(Some(s.to_string()));
);

from_env_var!(
    /// The chat server's database, holding `zerver_message` and friends
    let name = PgDatabase;
    let default: String = "zulip".to_string();
    let (env_var, allowed_values) = ("DB_NAME", "any database name");
    let from_str = |s| Some(s.to_string());
);

from_env_var!(
    let name = PgPort;
    let default: u16 = 5432;
    let (env_var, allowed_values) = ("DB_PORT", "a number between 1 and 65535");
    let from_str = |s| s.parse().ok().filter(|port: &u16| *port > 0);
);

from_env_var!(
    /// Whether to ask the server for TLS.  Connections are made without a TLS
    /// connector, so `prefer` falls back to plaintext
    let name = PgSslMode;
    let default: PgSslInner = PgSslInner::Prefer;
    let (env_var, allowed_values) = ("DB_SSLMODE", &format!("one of: {:?}", PgSslInner::VARIANTS));
    let from_str = |s| PgSslInner::from_str(s).ok();
);

/// The `sslmode` values a plaintext connection can honor.
#[derive(EnumString, VariantNames, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum PgSslInner {
    Disable,
    Prefer,
}
