//! Streaming core for the NLQ console: frame decoding, event normalization,
//! result accumulation and the query session lifecycle.

pub mod accumulator;
pub mod decoder;
mod error;
pub mod history;
pub mod normalize;
pub mod present;
pub mod session;

pub use accumulator::{Ingest, ResultAccumulator};
pub use decoder::{decode_frames, ByteStream, Frame, FrameDecoder, DONE_SENTINEL};
pub use error::{NormalizeError, SessionError, TransportError};
pub use history::{HistoryStats, QueryHistory};
pub use normalize::{normalize, parse_frame};
pub use present::{
    cell_text, columns, copy_tsv, export_csv, paginate, search, ExportError, Page,
};
pub use session::{
    EventSource, QuerySession, SessionConfig, SessionController, SessionOutcome, SessionPhase,
    SessionReport, SessionSnapshot,
};
