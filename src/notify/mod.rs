//! Best-effort delivery of "new listing" messages.

pub mod backend;
pub mod noop;
pub mod telegram;

use tracing::{info, warn};

use crate::models::Listing;
use backend::NotifyBackend;
use noop::NoopBackend;
use telegram::TelegramBot;

/// Sends one message per new listing. Failures are logged and swallowed.
pub struct Dispatcher {
    backend: Box<dyn NotifyBackend>,
}

impl Dispatcher {
    pub fn new(backend: Box<dyn NotifyBackend>) -> Self {
        Self { backend }
    }

    pub fn disabled() -> Self {
        Self::new(Box::new(NoopBackend))
    }

    /// Set up Telegram once at startup. Missing or rejected credentials
    /// disable notifications for the lifetime of the process.
    pub async fn from_credentials(token: Option<&str>, chat_id: Option<&str>) -> Self {
        let (Some(token), Some(chat_id)) = (token, chat_id) else {
            info!("No Telegram credentials configured, notifications disabled");
            return Self::disabled();
        };

        match TelegramBot::connect(token, chat_id).await {
            Ok(bot) => Self::new(Box::new(bot)),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Error initializing Telegram bot, notifications disabled");
                Self::disabled()
            }
        }
    }

    pub fn channel(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn notify(&self, listing: &Listing) {
        match self.backend.send(&listing.notification_text()).await {
            Ok(()) => info!(listing_id = %listing.id, channel = self.channel(), "Notification sent"),
            Err(e) => warn!(
                listing_id = %listing.id,
                channel = self.channel(),
                error = %format!("{e:#}"),
                "Error sending notification"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::backend::NotifyBackend;

    /// Records every message; optionally fails each send
    #[derive(Clone, Default)]
    pub struct RecordingBackend {
        pub sent: Arc<Mutex<Vec<String>>>,
        pub fail: bool,
    }

    impl RecordingBackend {
        pub fn messages(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotifyBackend for RecordingBackend {
        async fn send(&self, text: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                anyhow::bail!("channel unavailable");
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingBackend;
    use super::*;
    use crate::models::NOT_FOUND;

    fn listing() -> Listing {
        Listing {
            id: "1".into(),
            title: "Lamp".into(),
            price: "S$5".into(),
            seller_name: "bob".into(),
            posted_time: "just now".into(),
            condition: NOT_FOUND.into(),
            image_url: NOT_FOUND.into(),
            href: Listing::listing_url("1"),
        }
    }

    #[tokio::test]
    async fn delivers_formatted_message() {
        let backend = RecordingBackend::default();
        let dispatcher = Dispatcher::new(Box::new(backend.clone()));
        dispatcher.notify(&listing()).await;
        assert_eq!(backend.messages(), vec![listing().notification_text()]);
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let backend = RecordingBackend {
            fail: true,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(Box::new(backend.clone()));
        dispatcher.notify(&listing()).await;
        assert_eq!(backend.messages().len(), 1);
    }

    #[tokio::test]
    async fn missing_credentials_disable_channel() {
        assert_eq!(Dispatcher::from_credentials(None, Some("1")).await.channel(), "noop");
        assert_eq!(Dispatcher::from_credentials(Some("t"), None).await.channel(), "noop");
    }
}
