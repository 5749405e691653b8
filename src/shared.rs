//! Concurrency primitives shared between the write loop, the merge loop, and
//! readers: the single mutex guarding the index and segment counter, and the
//! request/response channel types used to talk to the two pipelines.

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::index::GlobalIndex;
use crate::record::Record;
use crate::Result;

/// Metadata mutated by both pipelines: the global index and the segment
/// counter used to name newly rolled segments. Never held across file I/O.
pub(crate) struct SharedState {
    pub index: GlobalIndex,
    pub segment_counter: u64,
    pub container: PathBuf,
}

pub(crate) type Shared = Arc<Mutex<SharedState>>;

/// One record to append, plus where to send the outcome. Carries its own
/// reply channel so concurrent callers never race over a shared response
/// channel: each [`crate::Store::put`] gets exactly one reply.
pub(crate) struct WriteRequest {
    pub record: Record,
    pub reply: Sender<Result<()>>,
}

/// A request to run one merge pass to completion.
pub(crate) struct MergeRequest {
    pub reply: Sender<Result<()>>,
}
