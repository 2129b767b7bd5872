use std::borrow::Cow;

/// Boxed error type returned by handler callbacks.
///
/// Any error that is `Send + Sync + 'static` converts into it via `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during event bus operations.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// A handler callback reported a failure during a dispatch pass.
    ///
    /// Handlers scheduled after the failing one in the same pass were not
    /// invoked; the bus itself remains fully usable.
    #[error("handler failed for {event}: {source}")]
    Handler {
        event: Cow<'static, str>,
        #[source]
        source: BoxError,
    },

    /// Occurs when an internal dynamic cast fails.
    /// This usually indicates an invariant violation in the type registry.
    #[error("Type mismatch{}: {message}", format_context(context))]
    TypeMismatch { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl EventBusError {
    pub(crate) fn handler<E>(source: BoxError) -> Self {
        Self::Handler { event: std::any::type_name::<E>().into(), source }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
