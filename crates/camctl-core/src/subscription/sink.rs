use crate::model::ContextUpdate;

/// Receiver of filtered context updates, supplied by the application.
///
/// Called inline on the device's stream task: implementations should hand
/// the update off quickly rather than block.
pub trait ContextSink: Send + Sync {
    fn update_context(&self, update: &ContextUpdate);
}

impl<F> ContextSink for F
where
    F: Fn(&ContextUpdate) + Send + Sync,
{
    fn update_context(&self, update: &ContextUpdate) {
        self(update);
    }
}
