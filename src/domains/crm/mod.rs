pub mod campaigns;
pub mod preferences;
pub mod segments;

pub use campaigns::CampaignService;
pub use preferences::PreferenceService;
pub use segments::{SegmentFilters, SegmentService};
