pub mod engine;
pub mod notifications;
pub mod rewards;
pub mod special;

pub use engine::GamificationEngine;
pub use notifications::NotificationService;
pub use rewards::RewardService;
pub use special::SpecialRewardService;
