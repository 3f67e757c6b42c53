pub mod child;
pub mod feeding;
pub mod invitation;
pub mod invitation_event;
pub mod user;

pub use child::ChildRepository;
pub use feeding::FeedingRepository;
pub use invitation::InvitationRepository;
pub use invitation_event::InvitationEventRepository;
pub use user::UserRepository;
