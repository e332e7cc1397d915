//! # Offline Sync Demo
//!
//! This example walks through the offline behaviour of the sync layer:
//! 1. Ann signs in, creates a family and writes a book
//! 2. The connection drops: lists come from the local mirror
//! 3. Messages sent while offline wait in the outbox
//! 4. The connection returns and the outbox flushes in order
//!
//! ## Run
//!
//! ```bash
//! cargo run --example offline_sync_demo
//! ```

use hearth_core::content::NewNote;
use hearth_core::model::tables;
use hearth_core::{FetchMode, SendOutcome, Session, SyncClient, SyncConfig, SyncEvent};
use serde_json::json;

#[tokio::main]
async fn main() -> hearth_core::Result<()> {
    hearth_core::logging::init();

    println!("=================================================");
    println!("           HEARTH OFFLINE SYNC DEMO");
    println!("=================================================\n");

    let (client, backend) = SyncClient::with_memory_backend(SyncConfig::default())?;
    let mut events = client.subscribe();

    // =========================================================================
    // STEP 1: Sign in and create some content
    // =========================================================================
    println!("1. Ann signs in and sets up a family...\n");

    client
        .start_session(
            Session {
                user_id: "ann".into(),
                email: Some("ann@example.com".into()),
                display_name: Some("Ann".into()),
                manager: true,
            },
            None,
        )
        .await?;
    let family = client.create_family("The Carters").await?;
    backend.seed(
        tables::FAMILY_MEMBERS,
        vec![json!({ "family_id": family.id, "user_id": "ben", "role": "member" })],
    );
    backend.seed(tables::PROFILES, vec![json!({ "id": "ben", "display_name": "Ben" })]);

    let book = client.content().create_book("Recipes", "Family favourites").await?;
    client
        .content()
        .create_note(NewNote {
            title: "Pancakes".into(),
            book_id: book.id.clone(),
            first_paragraph: Some("<p>Two eggs, one cup of flour.</p>".into()),
        })
        .await?;
    client.load_all().await?;

    println!("   Family:  {} ({})", family.name, family.id);
    println!("   Books:   {}", client.state().lists.read().books.len());
    println!("   Notes:   {}", client.state().lists.read().notes.len());
    println!("   Members: {}", client.state().lists.read().members.len());
    println!("   Channels: {:?}", client.realtime_channels());
    println!();

    // =========================================================================
    // STEP 2: Go offline and read from the mirror
    // =========================================================================
    println!("2. The connection drops...\n");

    backend.set_online(false);
    client.set_online(false).await;

    let summary = client.load_books(FetchMode::Replace).await?;
    println!("   Books source: {:?}", summary.source);
    println!("   Books shown:  {}", client.state().lists.read().books.len());
    println!("   Banner up:    {}", client.offline_banner());
    println!();

    // =========================================================================
    // STEP 3: Send while offline
    // =========================================================================
    println!("3. Ann messages Ben while offline...\n");

    for text in ["Dinner at six?", "Bring the pancake recipe"] {
        match client.send_message("ben", text).await? {
            SendOutcome::Sent(message) => println!("   Sent:   {}", message.content),
            SendOutcome::Queued(pending) => println!("   Queued: {}", pending.content),
        }
    }
    println!("   Pending for Ben: {}", client.pending_messages("ben").len());
    println!();

    // =========================================================================
    // STEP 4: Back online
    // =========================================================================
    println!("4. The connection returns...\n");

    backend.set_online(true);
    if let Some(report) = client.set_online(true).await {
        println!("   Delivered: {}", report.delivered.len());
        println!("   Remaining: {}", report.remaining);
    }
    for row in backend.rows(tables::MESSAGES) {
        println!("   Stored: {}", row["content"]);
    }
    println!();

    // =========================================================================
    // EVENTS
    // =========================================================================
    println!("Events seen:");
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::ViewRefreshed { .. } => {}
            other => println!("   {:?}", other),
        }
    }

    println!("\n=================================================");
    println!("                 DEMO COMPLETE");
    println!("=================================================");
    Ok(())
}
