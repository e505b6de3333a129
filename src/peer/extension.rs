use super::session::WireSession;
use crate::metainfo::{SignedMetainfo, SwarmId};

/// Protocol behavior attached to a session before it is wrapped as a peer.
///
/// Called once per discovered session with the swarm it belongs to and the
/// descriptor currently being shared, if any. An extension decides for itself
/// whether to attach; attaching is recorded with
/// [`WireSession::use_extension`].
pub trait WireExtension: Send + Sync {
    fn name(&self) -> &str;

    fn attach(
        &self,
        session: &mut WireSession,
        swarm: &SwarmId,
        metainfo: Option<&SignedMetainfo>,
    );
}
