//! The per-worker coordination state machine (`spec.md` §4.5): NONE →
//! INITIALIZING → CONFIGURING → SYNCING_ASSETS → SYNCING_EMISSIVE →
//! SYNCING_CAMERA → READY → RENDERING → (PAUSED ↔ RENDERING)* →
//! SYNCING_IMAGES → NONE.

use crate::error::ProtocolError;

use super::message::MessageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    None,
    Initializing,
    Configuring,
    SyncingAssets,
    SyncingEmissive,
    SyncingCamera,
    Ready,
    Rendering,
    Paused,
    SyncingImages,
}

impl WorkerState {
    /// The message kinds legal to receive while in this state, and the
    /// state each one drives the worker to. SYNC_MESH / SYNC_MATERIAL /
    /// SYNC_TEXTURE / SYNC_SHADER interleave freely within
    /// `SyncingAssets` and do not themselves advance the state.
    ///
    /// `Initializing` and `SyncingCamera` name the instant a worker spends
    /// inside the `INIT`/`SYNC_CAMERA` handler before replying `OK` — the
    /// spec's transition bullets always resolve past them in the same
    /// step, so no message is ever received while resting in either one.
    fn accepts(self, kind: MessageKind) -> Option<WorkerState> {
        use MessageKind::*;
        use WorkerState::*;
        match (self, kind) {
            (None, Init) => Some(Configuring),
            (Configuring, SyncConfig) => Some(SyncingAssets),
            (SyncingAssets, SyncMesh | SyncMaterial | SyncTexture | SyncShader) => Some(SyncingAssets),
            (SyncingAssets, SyncEmissive) => Some(SyncingEmissive),
            (SyncingEmissive, BuildBvh) => Some(SyncingEmissive),
            (SyncingEmissive, SyncWbvh) => Some(SyncingEmissive),
            (SyncingEmissive, SyncCamera) => Some(Ready),
            (Ready, RenderStart) => Some(Rendering),
            (Rendering, RenderPause) => Some(Paused),
            (Paused, RenderResume) => Some(Rendering),
            (Rendering, RenderStop) => Some(SyncingImages),
            (Paused, RenderStop) => Some(SyncingImages),
            (SyncingImages, Init) => Some(Configuring),
            _ => None,
        }
    }

    /// Validates `kind` against the current state, returning the state to
    /// transition to on success. Any other receipt is a protocol error:
    /// the caller should log and close the socket (`spec.md` §4.5).
    pub fn transition(self, kind: MessageKind) -> Result<WorkerState, ProtocolError> {
        self.accepts(kind).ok_or_else(|| ProtocolError::UnexpectedMessage {
            kind: kind.as_u32(),
            state: format!("{self:?}"),
        })
    }

    pub fn is_rendering(self) -> bool {
        matches!(self, WorkerState::Rendering | WorkerState::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkerState::*;

    #[test]
    fn init_moves_none_to_configuring() {
        assert_eq!(None.transition(MessageKind::Init).unwrap(), Configuring);
    }

    #[test]
    fn sync_camera_moves_syncing_emissive_straight_to_ready() {
        assert_eq!(SyncingEmissive.transition(MessageKind::SyncCamera).unwrap(), Ready);
    }

    #[test]
    fn asset_sync_messages_stay_in_syncing_assets() {
        let state = Configuring.transition(MessageKind::SyncConfig).unwrap();
        assert_eq!(state, SyncingAssets);
        let state = state.transition(MessageKind::SyncMesh).unwrap();
        assert_eq!(state, SyncingAssets);
        let state = state.transition(MessageKind::SyncMaterial).unwrap();
        assert_eq!(state, SyncingAssets);
    }

    #[test]
    fn pause_resume_round_trips_within_rendering() {
        let paused = Rendering.transition(MessageKind::RenderPause).unwrap();
        assert_eq!(paused, Paused);
        let resumed = paused.transition(MessageKind::RenderResume).unwrap();
        assert_eq!(resumed, Rendering);
    }

    #[test]
    fn unexpected_message_is_a_protocol_error() {
        assert!(Ready.transition(MessageKind::Ray).is_err());
    }

    #[test]
    fn render_stop_from_either_rendering_or_paused_reaches_syncing_images() {
        assert_eq!(
            Rendering.transition(MessageKind::RenderStop).unwrap(),
            SyncingImages
        );
        assert_eq!(Paused.transition(MessageKind::RenderStop).unwrap(), SyncingImages);
    }

    #[test]
    fn is_rendering_covers_both_active_states() {
        assert!(Rendering.is_rendering());
        assert!(Paused.is_rendering());
        assert!(!Ready.is_rendering());
    }
}
