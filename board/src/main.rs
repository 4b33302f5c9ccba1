// Noteboard - collaborative sticky-notes board
// Entry point: mounts a board against the configured store and follows it

use anyhow::Context;
use noteboard::board::{Board, BoardEvent};
use noteboard::config::{viewport_from_env, StoreConfig};
use noteboard::store;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "noteboard=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Noteboard");

    let store_config = StoreConfig::from_env().context("Failed to read store configuration")?;
    let viewport = viewport_from_env().context("Failed to read viewport")?;
    let store = store::connect(&store_config)
        .await
        .context("Failed to open note store")?;

    let mut board = Board::new(store, viewport);
    board.mount().await;
    log_board(&board);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    board
        .run(shutdown, |board, event| match event {
            BoardEvent::Reconciled { loaded: true } => log_board(board),
            other => tracing::debug!("{:?}", other),
        })
        .await;

    tracing::info!("Noteboard stopped");
    Ok(())
}

fn log_board(board: &Board) {
    tracing::info!("Board has {} notes", board.notes().len());
    for note in board.notes() {
        tracing::info!(
            "  {} at ({}, {}) {} {:?}{}",
            note.id,
            note.position_x,
            note.position_y,
            note.color,
            note.content,
            if note.has_author() {
                format!(" - {}", note.author_name)
            } else {
                String::new()
            }
        );
    }
}
