use async_trait::async_trait;
use tracing::info;

use crate::entities::{Item, Source};

/// Told about every email item that was stored.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn item_stored(&self, item: &Item, source: &Source) -> anyhow::Result<()>;
}

/// Emits a tracing event per stored item.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn item_stored(&self, item: &Item, source: &Source) -> anyhow::Result<()> {
        info!(
            user_id = %item.user_id,
            source_id = %source.id,
            item_id = %item.id,
            title = %item.title,
            "new newsletter item"
        );
        Ok(())
    }
}
