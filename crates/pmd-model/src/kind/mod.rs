mod level;
pub use level::Level;

mod state;
pub use state::JobState;
