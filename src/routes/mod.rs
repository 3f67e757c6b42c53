pub mod auth;
pub mod children;
pub mod feedings;
pub mod health;
pub mod invitations;
