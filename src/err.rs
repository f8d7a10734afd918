use crate::response::StoreErr;
use std::fmt;

/// Errors that keep the broker from starting.
pub enum FatalErr {
    Store(StoreErr),
    Logger(log::SetLoggerError),
    Unrecoverable,
    StdIo(std::io::Error),
    Dotenv(dotenv::Error),
    // config errs
    UrlParse(url::ParseError),
    UrlEncoding(std::string::FromUtf8Error),
    ConfigErr(String),
}

impl FatalErr {
    pub fn log(msg: impl fmt::Display) {
        eprintln!("{}", msg);
    }

    pub fn config(
        var: impl fmt::Display,
        value: impl fmt::Display,
        allowed_vals: impl fmt::Display,
    ) -> Self {
        Self::ConfigErr(format!(
            "{0} is set to `{1}`, which is invalid.\n{3:7}{0} must be {2}.",
            var, value, allowed_vals, ""
        ))
    }
}

impl std::error::Error for FatalErr {}
impl fmt::Debug for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl fmt::Display for FatalErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use FatalErr::*;
        write!(
            f,
            "{}",
            match self {
                Store(e) => format!("could not connect to Postgres.\n{:7}{}", "", e),
                Logger(e) => format!("{}", e),
                StdIo(e) => format!("{}", e),
                Dotenv(e) => format!("could not read the .env file.\n{:7}{}", "", e),
                ConfigErr(e) => e.to_string(),
                UrlParse(e) => format!("could not parse DATABASE_URL.\n{:7}{}", "", e),
                UrlEncoding(e) => format!("could not decode DATABASE_URL.\n{:7}{}", "", e),
                Unrecoverable => "The broker will now shut down.".into(),
            }
        )
    }
}

impl From<StoreErr> for FatalErr {
    fn from(e: StoreErr) -> Self {
        Self::Store(e)
    }
}
impl From<std::string::FromUtf8Error> for FatalErr {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::UrlEncoding(e)
    }
}
impl From<url::ParseError> for FatalErr {
    fn from(e: url::ParseError) -> Self {
        Self::UrlParse(e)
    }
}
impl From<std::io::Error> for FatalErr {
    fn from(e: std::io::Error) -> Self {
        Self::StdIo(e)
    }
}
impl From<log::SetLoggerError> for FatalErr {
    fn from(e: log::SetLoggerError) -> Self {
        Self::Logger(e)
    }
}
impl From<dotenv::Error> for FatalErr {
    fn from(e: dotenv::Error) -> Self {
        Self::Dotenv(e)
    }
}
