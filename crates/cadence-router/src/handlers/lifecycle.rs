//! Connection lifecycle
//!
//! Guests just attach to their session. Logged-in users go through the
//! [`ConnectionDirectory`](crate::directory::ConnectionDirectory): the first
//! connection binds, a later one starts a hand-off that the old client ends by
//! sending `disconnect {sid}` after flushing its state. A watchdog forces the
//! hand-off if that never happens.

use cadence_core::{events, ConnectionId, Envelope};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::directory::{Binding, ConnectOutcome};
use crate::dispatch::{Args, EventTable, Handler};
use crate::error::Result;
use crate::identity::Identity;
use crate::signature::Signature;
use crate::state::{HubContext, HubState};

pub fn register(table: &mut EventTable<HubContext>) -> Result<()> {
    table.register(
        events::CONNECTION,
        Handler::new("connect", Signature::new(), on_connect),
    )?;
    table.register(
        events::DISCONNECT,
        Handler::new("teardown", Signature::new(), on_disconnect),
    )?;
    table.register(
        events::DISCONNECT,
        Handler::new("drop", Signature::parse(["sid"])?, on_drop_request),
    )?;
    Ok(())
}

async fn on_connect(ctx: HubContext, _args: Args) -> Result<()> {
    let HubContext { hub, conn } = ctx;
    hub.sessions().attach(&conn.session_id);

    let Some(identity) = conn.identity().cloned() else {
        debug!("Guest {} joined session {}", conn.id, conn.session_id);
        return conn.emit(&Envelope::ready(false)).await;
    };

    match hub.directory().connect(&identity.id, &conn.id) {
        ConnectOutcome::Bound | ConnectOutcome::AlreadyBound => {
            info!("{} bound to {}", identity, conn.id);
            hub.writer()
                .write_connection_id(&identity, Some(conn.id.clone()));
            conn.emit(&Envelope::ready(false)).await
        }
        ConnectOutcome::Handoff {
            old,
            replaced,
            watchdog,
        } => {
            if let Some(replaced) = replaced.and_then(|id| hub.connection(&id)) {
                info!("{}: pending successor {} replaced by {}", identity, replaced.id, conn.id);
                if let Err(e) = replaced.emit(&Envelope::disconnected(&conn.id)).await {
                    debug!("Could not notify {}: {}", replaced.id, e);
                }
                replaced.terminate().await;
            }

            match hub.connection(&old) {
                Some(old_conn) => {
                    info!("{}: handing off {} -> {}", identity, old, conn.id);
                    if let Err(e) = old_conn.emit(&Envelope::disconnected(&conn.id)).await {
                        warn!("Could not notify {} of hand-off: {}", old, e);
                    }
                    spawn_watchdog(hub, identity, old, watchdog);
                    Ok(())
                }
                // already gone, nothing to wait for
                None => finish_handoff(&hub, &identity, &old).await,
            }
        }
    }
}

async fn on_disconnect(ctx: HubContext, _args: Args) -> Result<()> {
    let HubContext { hub, conn } = ctx;
    hub.remove_connection(&conn.id);
    hub.sessions().detach(&conn.session_id);

    let Some(identity) = conn.identity().cloned() else {
        debug!("Guest {} left session {}", conn.id, conn.session_id);
        return Ok(());
    };

    match hub.directory().binding(&identity.id) {
        Binding::Bound(active) if active == conn.id => {
            if hub.directory().release(&identity.id, &conn.id) {
                info!("{} unbound ({} closed)", identity, conn.id);
                hub.writer().write_connection_id(&identity, None);
            }
        }
        Binding::HandoffPending { old, .. } if old == conn.id => {
            finish_handoff(&hub, &identity, &conn.id).await?;
        }
        Binding::HandoffPending { new, .. } if new == conn.id => {
            if let Some(old) = hub.directory().cancel_handoff(&identity.id, &conn.id) {
                info!("{}: successor {} left, {} stays active", identity, conn.id, old);
            }
        }
        _ => debug!("{}: superseded connection {} closed", identity, conn.id),
    }
    Ok(())
}

/// `disconnect {sid}`: a client asks for a connection to be dropped
async fn on_drop_request(ctx: HubContext, args: Args) -> Result<()> {
    let sid: ConnectionId = args.required(0)?;
    let HubContext { hub, conn } = ctx;

    let identity = conn.identity().cloned();
    let pending_old = identity.as_ref().and_then(|id| match hub.directory().binding(&id.id) {
        Binding::HandoffPending { old, .. } => Some(old),
        _ => None,
    });

    if let (Some(identity), Some(old)) = (&identity, &pending_old) {
        if *old == sid {
            return finish_handoff(&hub, identity, &sid).await;
        }
    }

    if sid == conn.id {
        conn.terminate().await;
        return Ok(());
    }

    let Some(target) = hub.connection(&sid) else {
        debug!("{} asked to drop unknown connection {}", conn.id, sid);
        return Ok(());
    };

    match (&identity, target.identity()) {
        (Some(requester), Some(owner)) if requester == owner => {
            info!("{}: {} dropped {}", requester, conn.id, sid);
            target.terminate().await;
        }
        _ => warn!("Ignoring request from {} to drop {} of another user", conn.id, sid),
    }
    Ok(())
}

fn spawn_watchdog(
    hub: Arc<HubState>,
    identity: Identity,
    old: ConnectionId,
    watchdog: CancellationToken,
) {
    let timeout = hub.config().handoff_timeout();
    tokio::spawn(async move {
        tokio::select! {
            _ = watchdog.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                warn!("{}: hand-off from {} not confirmed after {:?}, forcing", identity, old, timeout);
                if let Err(e) = finish_handoff(&hub, &identity, &old).await {
                    warn!("{}: forced hand-off failed: {}", identity, e);
                }
            }
        }
    });
}

/// Make the successor of `old` active: drop `old`, flush, then send `ready {force}`
pub(crate) async fn finish_handoff(
    hub: &Arc<HubState>,
    identity: &Identity,
    old: &str,
) -> Result<()> {
    let Some(new) = hub.directory().complete_handoff(&identity.id, old) else {
        return Ok(());
    };

    if let Some(old_conn) = hub.connection(old) {
        old_conn.terminate().await;
    }

    hub.writer()
        .write_connection_id(identity, Some(new.clone()));
    if let Err(e) = hub
        .writer()
        .flush(identity, hub.config().flush_timeout())
        .await
    {
        warn!("{}: profile writes still pending at hand-off: {}", identity, e);
    }

    info!("{}: hand-off complete, {} active", identity, new);
    match hub.connection(&new) {
        Some(new_conn) => new_conn.emit(&Envelope::ready(true)).await,
        None => Ok(()),
    }
}
