pub mod record;
pub mod session;
pub mod verification;
