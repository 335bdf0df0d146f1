use crate::updater::UpdateReport;
use chatterbox::message::{Dispatcher, Message};
use futures_util::TryFutureExt;
use log::{error, info};

pub fn setup_dispatcher() -> Dispatcher {
    let slack = match std::env::var("DOCKHAND_SLACK_WEBHOOK_URL") {
        Ok(webhook_url) => {
            info!("Using Slack dispatcher");
            let channel = std::env::var("DOCKHAND_SLACK_CHANNEL")
                .expect("DOCKHAND_SLACK_CHANNEL not defined");
            Some(chatterbox::dispatcher::slack::Slack {
                webhook_url,
                channel,
            })
        }
        Err(_) => {
            info!("DOCKHAND_SLACK_WEBHOOK_URL not defined");
            None
        }
    };
    let telegram = match std::env::var("DOCKHAND_TELEGRAM_BOT_TOKEN") {
        Ok(bot_token) => {
            info!("Using Telegram dispatcher");
            let chat_id = std::env::var("DOCKHAND_TELEGRAM_CHAT_ID")
                .expect("DOCKHAND_TELEGRAM_CHAT_ID not defined");
            Some(chatterbox::dispatcher::telegram::Telegram { bot_token, chat_id })
        }
        Err(_) => {
            info!("DOCKHAND_TELEGRAM_BOT_TOKEN not defined");
            None
        }
    };
    let sender = chatterbox::dispatcher::Sender {
        slack,
        telegram,
        email: None,
    };

    Dispatcher::new(sender)
}

/// One message per cycle that changed something or failed; quiet cycles
/// stay quiet.
pub async fn notify_report(dispatcher: &Dispatcher, report: &UpdateReport) {
    if report.updated_count() == 0 && report.failure_count() == 0 {
        return;
    }
    let message = Message::new("fleet reconciliation".to_string(), report.to_string());
    _ = dispatcher
        .dispatch(&message)
        .inspect_err(|e| error!("failed to dispatch message: {e}"))
        .await;
}
