//! The renderer/worker wire protocol (`spec.md` §4.5, §6): message
//! catalog, length-prefixed framing, and the per-worker coordination
//! state machine.

mod codec;
mod message;
mod state_machine;
mod wire_ray;

pub use codec::{decode_body, encode_body, read_message, write_message};
pub use message::{LightList, Message, MessageKind, MeshAssets, RenderRange};
pub use state_machine::WorkerState;
