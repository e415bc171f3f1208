use nudge_core::schedule::{NotificationRequest, Notifier};
use uuid::Uuid;

/// Records reminders through `tracing` instead of an OS notification center
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    async fn issue(&self, request: &NotificationRequest) -> nudge_core::Result<Vec<String>> {
        let handle = Uuid::now_v7().to_string();
        tracing::info!(
            note_id = %request.entity_id,
            trigger_at = request.trigger_at,
            title = %request.title,
            handle = %handle,
            "Reminder scheduled"
        );
        Ok(vec![handle])
    }

    async fn cancel(&self, handles: &[String]) -> nudge_core::Result<()> {
        if !handles.is_empty() {
            tracing::info!(handles = ?handles, "Reminder canceled");
        }
        Ok(())
    }
}
