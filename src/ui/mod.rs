/// UI module exports
pub mod components;
pub mod history;
pub mod overlay;
pub mod popup;
