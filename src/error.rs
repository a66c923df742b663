use std::fmt;

use failure::Backtrace;
use failure::Context;
use failure::Fail;

use zookeeper::ZkError;


/// Error information returned by this crate's API in case of errors.
#[derive(Debug)]
pub struct Error(Context<ErrorKind>);

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.0.get_context().clone()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error(Context::new(kind))
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error(inner)
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&Fail> {
        self.0.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.0.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}


/// Exhaustive list of possible errors emitted by this crate.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "connection to the zookeeper ensemble failed")]
    BackendConnect,

    #[fail(display = "{} failed due to a zookeeper error", _0)]
    Backend(&'static str),

    #[fail(display = "failed to decode {}", _0)]
    Decode(&'static str),

    #[fail(display = "failed to encode {}", _0)]
    Encode(&'static str),

    #[fail(display = "unable to spawn new thread for '{}'", _0)]
    SpawnThread(&'static str),

    #[fail(display = "node does not exist: {}", _0)]
    NoNode(String),

    #[fail(display = "node already exists: {}", _0)]
    NodeExists(String),

    #[fail(display = "node has children: {}", _0)]
    NotEmpty(String),

    #[fail(display = "version mismatch for node: {}", _0)]
    BadVersion(String),

    #[fail(display = "lost connection to the zookeeper ensemble")]
    ConnectionLoss,

    #[fail(display = "zookeeper session expired")]
    SessionExpired,

    #[fail(display = "zookeeper client is closing")]
    Closing,

    #[fail(display = "zookeeper operation timed out")]
    OperationTimeout,

    #[fail(display = "invalid ACL for node: {}", _0)]
    InvalidAcl(String),

    #[fail(display = "invalid arguments for zookeeper operation")]
    BadArguments,

    #[fail(display = "async result timed out before completion")]
    Timeout,

    #[fail(display = "hashring has no nodes")]
    EmptyHashring,

    #[fail(display = "zookeeper operation on {} failed with {}", _0, _1)]
    Other(String, String),
}

impl ErrorKind {
    /// Map a `zookeeper::ZkError` returned by a call against `path` into an `ErrorKind`.
    pub fn from_zk(error: ZkError, path: &str) -> ErrorKind {
        match error {
            ZkError::NoNode => ErrorKind::NoNode(path.to_string()),
            ZkError::NodeExists => ErrorKind::NodeExists(path.to_string()),
            ZkError::NotEmpty => ErrorKind::NotEmpty(path.to_string()),
            ZkError::BadVersion => ErrorKind::BadVersion(path.to_string()),
            ZkError::ConnectionLoss => ErrorKind::ConnectionLoss,
            ZkError::SessionExpired => ErrorKind::SessionExpired,
            ZkError::SessionMoved => ErrorKind::SessionExpired,
            ZkError::Closing => ErrorKind::Closing,
            ZkError::OperationTimeout => ErrorKind::OperationTimeout,
            ZkError::InvalidACL => ErrorKind::InvalidAcl(path.to_string()),
            ZkError::BadArguments => ErrorKind::BadArguments,
            other => ErrorKind::Other(path.to_string(), format!("{:?}", other)),
        }
    }
}


/// Short form alias for functions returning `Error`s.
pub type Result<T> = ::std::result::Result<T, Error>;
