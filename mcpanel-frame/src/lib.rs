mod codec;
mod error;
mod extractor;
mod message;

pub use codec::{
    FRAME_PREFIX, FRAME_SUFFIX, LINE_PREFIX, decode_payload, decode_request,
    encode_frame, encode_line, encode_request,
};
pub use error::FrameError;
pub use extractor::{
    DEFAULT_MAX_PENDING, Extracted, FrameExtractor, Split, extract_all,
    extract_line_frames, filter, split,
};
pub use message::{
    BridgeReady, Event, EventKind, Frame, PlayerEntry, PlayerRef,
    PlayersUpdate, Request, RequestType, Response, StatusUpdate,
};
