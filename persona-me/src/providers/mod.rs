//! Avatar renderer implementations

pub mod viseme;
pub use viseme::VisemeRenderer;
