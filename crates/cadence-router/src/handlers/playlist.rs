//! `playlist` operations
//!
//! | payload                      | operation      |
//! |------------------------------|----------------|
//! | `{}`                         | get-or-create  |
//! | `{forceGet}`                 | force-get      |
//! | `{addedTrack, insert?}`      | add track      |
//! | `{removeIndex, newIndex?}`   | remove track   |
//! | `{cIndex?, cTime?}`          | update cursor  |
//! | `{cont?, repeat?, vol?}`     | update options |
//!
//! The session cache is authoritative; for logged-in users every mutation is
//! mirrored to the profile store through the hub's writer. Reads from the
//! store first wait for that identity's queued writes, and fall back to the
//! session copy when those do not settle in time.

use cadence_core::{events, Envelope, PlaylistState, Track};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch::{Args, EventTable, Fallback, Handler};
use crate::error::{Result, RouterError};
use crate::signature::{dispatch_key, Signature};
use crate::connection::Connection;
use crate::identity::Identity;
use crate::state::{HubContext, HubState};

pub fn register(table: &mut EventTable<HubContext>) -> Result<()> {
    let router = table.router_mut(events::PLAYLIST);
    router.register(Handler::new("get", Signature::new(), get_or_create))?;
    router.register(Handler::new(
        "force_get",
        Signature::parse(["forceGet"])?,
        force_get,
    ))?;
    router.register(Handler::new(
        "add_track",
        Signature::parse(["addedTrack", "$insert"])?,
        add_track,
    ))?;
    router.register(Handler::new(
        "remove_track",
        Signature::parse(["removeIndex", "$newIndex"])?,
        remove_track,
    ))?;
    router.register(Handler::new(
        "update_cursor",
        Signature::parse(["$cIndex", "$cTime"])?,
        update_cursor,
    ))?;
    router.register(Handler::new(
        "update_options",
        Signature::parse(["$cont", "$repeat", "$vol"])?,
        update_options,
    ))?;
    router.register_fallback(Fallback::new("unrecognized", unrecognized))?;
    Ok(())
}

async fn get_or_create(ctx: HubContext, _args: Args) -> Result<()> {
    let HubContext { hub, conn } = ctx;

    let settled = match conn.identity() {
        Some(identity) => settle(&hub, identity).await.then_some(identity),
        None => None,
    };
    let state = match settled {
        Some(identity) => load_or_create(&hub, &conn, identity).await,
        None => hub.sessions().get_or_insert_playlist(&conn.session_id).0,
    };

    conn.emit_json(events::PLAYLIST_DATA_RESPONSE, &state).await
}

// A non-empty profile playlist wins over the session cache
async fn load_or_create(hub: &HubState, conn: &Connection, identity: &Identity) -> PlaylistState {
    match hub.profiles().get_playlist(identity).await {
        Ok(Some(persisted)) if persisted != PlaylistState::default() => {
            hub.sessions()
                .set_playlist(&conn.session_id, persisted.clone());
            persisted
        }
        fetched => {
            if let Err(e) = &fetched {
                warn!("{}: could not load playlist: {}", identity, e);
            }
            let (state, created) = hub.sessions().get_or_insert_playlist(&conn.session_id);
            // an unreadable store counts as having a playlist
            if created && matches!(fetched, Ok(None)) {
                hub.writer().write_playlist(identity, state.clone());
            }
            state
        }
    }
}

async fn force_get(ctx: HubContext, _args: Args) -> Result<()> {
    let HubContext { hub, conn } = ctx;
    let identity = conn.identity().ok_or(RouterError::NotAuthenticated)?;

    if !settle(&hub, identity).await {
        if let Some(cached) = hub.sessions().playlist(&conn.session_id) {
            return conn.emit_json(events::PLAYLIST_DATA_RESPONSE, &cached).await;
        }
    }

    let state = hub
        .profiles()
        .get_playlist(identity)
        .await?
        .unwrap_or_default();
    hub.sessions()
        .set_playlist(&conn.session_id, state.clone());

    conn.emit_json(events::PLAYLIST_DATA_RESPONSE, &state).await
}

async fn add_track(ctx: HubContext, args: Args) -> Result<()> {
    let track: Track = args.required(0)?;
    let insert = args.truthy(1);
    let HubContext { hub, conn } = ctx;

    let state = hub
        .sessions()
        .modify_or_create_playlist(&conn.session_id, |p| {
            p.add_track(track, insert).map(|_| p.clone())
        })?;

    persist(&hub, &conn, state);
    Ok(())
}

async fn remove_track(ctx: HubContext, args: Args) -> Result<()> {
    let index = args
        .position(0)?
        .ok_or_else(|| RouterError::invalid_argument("removeIndex", "missing"))?;
    let new_index = args.index(1)?;
    let HubContext { hub, conn } = ctx;

    let state = hub
        .sessions()
        .modify_playlist(&conn.session_id, |p| {
            p.remove_track(index, new_index).map(|_| p.clone())
        })
        .ok_or_else(|| RouterError::EmptyState(conn.session_id.clone()))??;

    persist(&hub, &conn, state);
    Ok(())
}

async fn update_cursor(ctx: HubContext, args: Args) -> Result<()> {
    let index = args.index(0)?;
    let time = args.number(1)?;
    let HubContext { hub, conn } = ctx;

    let state = hub
        .sessions()
        .modify_playlist(&conn.session_id, |p| {
            p.update_cursor(index, time);
            p.clone()
        })
        .ok_or_else(|| RouterError::EmptyState(conn.session_id.clone()))?;

    if let Some(identity) = conn.identity() {
        hub.writer().write_playlist(identity, state);
        if let Err(e) = hub
            .writer()
            .flush(identity, hub.config().flush_timeout())
            .await
        {
            warn!("{}: cursor write not confirmed: {}", identity, e);
        }
    }

    conn.emit(&Envelope::bare(events::PL_UPDATE_CURRENT_FINISH))
        .await
}

async fn update_options(ctx: HubContext, args: Args) -> Result<()> {
    let continuous = args.is_present(0).then(|| args.truthy(0));
    let repeat = args.is_present(1).then(|| args.truthy(1));
    let volume = args.number(2)?;
    let HubContext { hub, conn } = ctx;

    let state = hub
        .sessions()
        .modify_or_create_playlist(&conn.session_id, |p| {
            p.update_options(continuous, repeat, volume);
            p.clone()
        });

    persist(&hub, &conn, state);
    Ok(())
}

async fn unrecognized(ctx: HubContext, payload: Option<Value>) -> Result<()> {
    let key = match &payload {
        Some(Value::Object(map)) => dispatch_key(map.keys().map(String::as_str)),
        _ => String::new(),
    };
    warn!("Unrecognized playlist request [{}] from {}", key, ctx.conn.id);
    ctx.conn
        .emit(&Envelope::error(
            events::PLAYLIST,
            format!("unrecognized playlist request [{}]", key),
        ))
        .await
}

// Whether the profile store holds this session's latest playlist: queued
// writes have landed and the last one did not give up
async fn settle(hub: &HubState, identity: &Identity) -> bool {
    if let Err(e) = hub
        .writer()
        .flush(identity, hub.config().flush_timeout())
        .await
    {
        warn!("{}: writes still pending, serving session copy: {}", identity, e);
        return false;
    }
    if hub.writer().is_diverged(identity) {
        warn!("{}: profile is behind the session, serving session copy", identity);
        return false;
    }
    true
}

// Mirror a mutation to the profile store when the connection is logged in
fn persist(hub: &HubState, conn: &Connection, state: PlaylistState) {
    match conn.identity() {
        Some(identity) => {
            hub.writer().write_playlist(identity, state);
        }
        None => debug!("Guest session {} updated", conn.session_id),
    }
}
