//! Collaborators the migration engine consumes but does not own: time, ids, and image
//! decoding.

pub mod clock;
pub mod ids;
pub mod media;

pub use clock::{Clock, FixedClock, SystemClock};
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use media::{
    DEFAULT_PREVIEW_EDGE, Dimensions, ImageProbe, NoMedia, Preview, PreviewSynthesizer,
    RasterMedia,
};
