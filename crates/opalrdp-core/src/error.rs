use core::fmt;

/// Marker for error sources attachable to [`Error`].
pub trait Source: std::error::Error + Sync + Send + 'static {}

impl<T> Source for T where T: std::error::Error + Sync + Send + 'static {}

/// Generic error with a static context string, a domain-specific kind and an
/// optional source chain.
///
/// Each crate of the stack defines its own `Kind` enum and aliases this type.
#[derive(Debug)]
pub struct Error<Kind> {
    pub context: &'static str,
    pub kind: Kind,
    source: Option<Box<dyn std::error::Error + Sync + Send>>,
}

impl<Kind> Error<Kind> {
    #[cold]
    #[must_use]
    pub fn new(context: &'static str, kind: Kind) -> Self {
        Self {
            context,
            kind,
            source: None,
        }
    }

    #[cold]
    #[must_use]
    pub fn with_source<E: Source>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Formats the whole cause chain on one line.
    pub fn report(&self) -> ErrorReport<'_, Kind> {
        ErrorReport(self)
    }
}

impl<Kind: fmt::Display> fmt::Display for Error<Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.context, self.kind)
    }
}

impl<Kind> std::error::Error for Error<Kind>
where
    Kind: std::error::Error,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Some(source) = self.kind.source() {
            Some(source)
        } else if let Some(e) = &self.source {
            Some(e.as_ref())
        } else {
            None
        }
    }
}

impl<Kind> From<Error<Kind>> for std::io::Error
where
    Kind: std::error::Error + Send + Sync + 'static,
{
    fn from(error: Error<Kind>) -> Self {
        Self::other(error)
    }
}

pub struct ErrorReport<'a, Kind>(&'a Error<Kind>);

impl<Kind: std::error::Error> fmt::Display for ErrorReport<'_, Kind> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use std::error::Error as _;

        write!(f, "{}", self.0)?;

        let mut next_source = self.0.source();

        while let Some(e) = next_source {
            write!(f, ", caused by: {e}")?;
            next_source = e.source();
        }

        Ok(())
    }
}

// Constructor traits implemented by both EncodeError and DecodeError so the
// ensure_size!/invalid_field_err! macros work in either direction.

pub trait NotEnoughBytesErr {
    fn not_enough_bytes(context: &'static str, received: usize, expected: usize) -> Self;
}

pub fn not_enough_bytes_err<T: NotEnoughBytesErr>(context: &'static str, received: usize, expected: usize) -> T {
    T::not_enough_bytes(context, received, expected)
}

pub trait InvalidFieldErr {
    fn invalid_field(context: &'static str, field: &'static str, reason: &'static str) -> Self;
}

pub fn invalid_field_err<T: InvalidFieldErr>(context: &'static str, field: &'static str, reason: &'static str) -> T {
    T::invalid_field(context, field, reason)
}

pub fn invalid_field_err_with_source<T, E>(
    context: &'static str,
    field: &'static str,
    reason: &'static str,
    source: E,
) -> T
where
    T: InvalidFieldErr + WithSource,
    E: Source,
{
    T::invalid_field(context, field, reason).with_source(source)
}

pub trait UnexpectedMessageTypeErr {
    fn unexpected_message_type(context: &'static str, got: u8) -> Self;
}

pub fn unexpected_message_type_err<T: UnexpectedMessageTypeErr>(context: &'static str, got: u8) -> T {
    T::unexpected_message_type(context, got)
}

pub trait UnsupportedVersionErr {
    fn unsupported_version(context: &'static str, got: u8) -> Self;
}

pub fn unsupported_version_err<T: UnsupportedVersionErr>(context: &'static str, got: u8) -> T {
    T::unsupported_version(context, got)
}

pub trait OtherErr {
    fn other(context: &'static str, description: &'static str) -> Self;
}

pub fn other_err<T: OtherErr>(context: &'static str, description: &'static str) -> T {
    T::other(context, description)
}

pub fn other_err_with_source<T, E>(context: &'static str, description: &'static str, source: E) -> T
where
    T: OtherErr + WithSource,
    E: Source,
{
    T::other(context, description).with_source(source)
}

pub trait WithSource {
    #[must_use]
    fn with_source<E: Source>(self, source: E) -> Self;
}

impl<T> WithSource for Error<T> {
    fn with_source<E: Source>(self, source: E) -> Self {
        self.with_source(source)
    }
}
