//! # Showfest Binary
//!
//! The entry point that assembles the application based on compile-time
//! features, then walks one studio session end to end against the chosen
//! plugins.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use sf_core::{
    AccessPolicy, AppConfig, DocumentStore, IdentitySource, Principal, VoteChoice,
    BANNERS_COLLECTION,
};
use sf_widgets::{Catalog, SelectBus, Showcase, StudioSession};

// Feature-gated imports: the binary is compiled to order
#[cfg(feature = "store-memory")]
use sf_store_memory::MemoryStore;

#[cfg(feature = "auth-local")]
use sf_auth_local::LocalIdentitySource;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // The in-memory stack needs no backend credentials; a missing config
    // only demotes the policy to the bundled demo defaults.
    let policy = match AppConfig::load() {
        Ok(config) => {
            tracing::info!(
                admins = config.admin_emails.len(),
                domain = config.allowed_domain.as_deref().unwrap_or("(any)"),
                project = %config.backend.project_id,
                "configuration loaded"
            );
            config.policy()
        }
        Err(err) => {
            tracing::warn!(error = %err, "no usable configuration, using demo policy");
            AccessPolicy::new(None, ["admin@festival.example"])
        }
    };

    // 1. Initialize the document store implementation
    #[cfg(feature = "store-memory")]
    let store = Arc::new(MemoryStore::new());

    // 2. Initialize the identity implementation
    #[cfg(feature = "auth-local")]
    let identity = Arc::new(
        LocalIdentitySource::new()
            .with_account(
                "guest",
                Principal {
                    id: "u-guest".into(),
                    email: Some("guest@festival.example".into()),
                    display_name: Some("Festival Guest".into()),
                },
            )
            .with_account(
                "admin",
                Principal {
                    id: "u-admin".into(),
                    email: Some("admin@festival.example".into()),
                    display_name: Some("Festival Admin".into()),
                },
            ),
    );

    seed_banners(store.as_ref()).await?;

    // 3. Pick the studio on display. The showcase follows the selection
    // bus, so it must be attached before anything emits.
    let catalog = Catalog::bundled()?;
    let bus = SelectBus::new();
    let mut showcase = Showcase::new(catalog);
    showcase.follow(&bus);
    bus.emit("arisu");
    let studio = showcase.pump().clone();
    tracing::info!(studio = %studio.name, slug = %studio.slug, "showcase selected");

    // 4. Run one session against the assembled plugins
    let mut session = StudioSession::new(
        studio.slug.clone(),
        policy,
        store.clone() as Arc<dyn DocumentStore>,
        identity as Arc<dyn IdentitySource>,
    );
    session.pump().await;

    if let Some(banner) = session.banner().active() {
        tracing::info!(label = %banner.label, message = %banner.message, "banner on display");
    }

    session.sign_in("guest").await?;
    tracing::info!("signed in as guest");

    session.votes_mut().cast_vote(VoteChoice::Up).await?;
    session.comments_mut().post_comment("Loved the fountain piece!", None).await?;
    session.pump().await;

    tracing::info!(
        approval = session.votes().tally().approval(),
        votes = session.votes().tally().total(),
        comments = session.comments().comment_count(),
        status = %session.votes().status_line(),
        "session state after guest activity"
    );

    session.banner_mut().advance();
    if let Some(banner) = session.banner().active() {
        tracing::info!(label = %banner.label, "banner rotated");
    }

    session.sign_out().await?;
    tracing::info!("signed out, session complete");
    Ok(())
}

async fn seed_banners(store: &dyn DocumentStore) -> Result<()> {
    store
        .set_record(
            BANNERS_COLLECTION,
            "opening",
            json!({
                "label": "Opening",
                "slug": "opening",
                "message": "Gates open at noon. See [the map](https://festival.example/map).",
                "order": 0,
            }),
        )
        .await?;
    store
        .set_record(
            BANNERS_COLLECTION,
            "closing",
            json!({
                "label": "Closing Night",
                "slug": "closing-night",
                "message": "Fireworks at ten by the south lawn.",
                "order": 1,
            }),
        )
        .await?;
    Ok(())
}
