use std::fmt;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("socket activation failed: {0}")]
    Activation(String),

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("copy {direction} failed: {source}")]
    Copy {
        direction: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("could not close {stream} stream: {source}")]
    Close {
        stream: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept new connection: {0}")]
    Accept(#[source] io::Error),

    #[error("task {0} exited without returning a result")]
    TaskPanicked(&'static str),

    #[error("multiple errors: {0}")]
    Multiple(ErrorSet),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Unordered collection of the errors raised inside one scope.
#[derive(Debug, Default)]
pub struct ErrorSet(Vec<Error>);

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }

    /// Collapse the set: nothing is success, a single error is returned as
    /// is, anything more becomes [`Error::Multiple`].
    pub fn into_result(mut self) -> Result<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(Error::Multiple(self)),
        }
    }
}

impl From<Vec<Error>> for ErrorSet {
    fn from(errors: Vec<Error>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for ErrorSet {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, err) in self.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        write!(f, "]")
    }
}

/// Whether `err` is the ordinary result of a peer going away or of our own
/// side closing the stream, rather than a real I/O failure.
pub fn is_benign_closure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}
