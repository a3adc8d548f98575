use std::fmt;

/// Faults that are not generation outcomes: setup, configuration
/// and serving. Backend faults never show up here; they are folded
/// into `crate::request::Failure` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Configuration value is missing or unusable
    InvalidConfiguration(String)
  , /// HTTP client could not be constructed
    HttpClient(String)
  , /// Listener could not be bound or the server stopped
    Serve(String)
  , /// Reading a config file failed
    Io(String)
  , /// Config file was not valid JSON for `RelayConfig`
    ParseError(String)
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::HttpClient(msg) => {
              write!(f, "HTTP client error: {}", msg)
            }
          , Error::Serve(msg) => {
              write!(f, "Relay server error: {}", msg)
            }
          , Error::Io(msg) => {
              write!(f, "I/O error: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error
{   fn from(e: std::io::Error) -> Self
    {   Error::Io(e.to_string())
    }
}
