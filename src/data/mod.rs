pub mod nmrpipe_format;

pub use nmrpipe_format::{PipeDataset, PipeFile};
