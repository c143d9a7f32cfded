use teloxide::{dptree, prelude::*, types::Update};
use tracing::{error, info};

use crate::settings::BOT_USERNAME;

pub mod handlers;
pub mod invoice;
pub mod keyboards;
pub mod staff;

/// Customer bot: commands, menu callbacks and Telegram Payments.
pub async fn run_bot(
    bot: Bot,
    mut shutdown_signal: tokio::sync::broadcast::Receiver<()>,
    state: crate::AppState,
) {
    info!("Starting customer bot dispatcher...");

    match bot.get_me().await {
        Ok(me) => {
            let username = me.username.clone().unwrap_or_else(|| "unknown".into());
            info!("Customer bot connected as: @{}", username);
            if let Err(e) = state.settings.set(BOT_USERNAME, &username).await {
                error!("Failed to store bot username: {:#}", e);
            }
        }
        Err(e) => {
            error!("Customer bot failed to connect to Telegram: {}", e);
            return;
        }
    }

    let message_handler = Update::filter_message().endpoint(handlers::command::message_handler);
    let callback_handler = Update::filter_callback_query().endpoint(handlers::callback::callback_handler);
    let pre_checkout_handler =
        Update::filter_pre_checkout_query().endpoint(handlers::payment::pre_checkout_handler);

    let mut dispatcher = Dispatcher::builder(
        bot,
        dptree::entry()
            .branch(message_handler)
            .branch(callback_handler)
            .branch(pre_checkout_handler),
    )
    .dependencies(dptree::deps![state])
    .default_handler(|upd: std::sync::Arc<Update>| async move {
        info!("Unhandled update: {:?}", upd.id);
    })
    .build();

    tokio::select! {
        _ = dispatcher.dispatch() => {
            info!("Customer bot dispatcher exited");
        }
        _ = shutdown_signal.recv() => {
            info!("Customer bot received shutdown signal, stopping...");
        }
    }
}
