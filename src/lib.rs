/// X Screen Time - Chrome Extension for limiting time on X
/// Built with Rust + WASM + Yew

mod background;
mod chrome;
mod clock;
mod config;
mod counter;
mod error;
mod monitor;
mod report;
mod site;
mod storage;
mod usage_data;
pub mod ui;

use config::TrackerConfig;
use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export URL matching for JavaScript access
#[wasm_bindgen]
pub fn is_tracked_url(url: &str) -> bool {
    site::is_tracked_url(url)
}

// Run the usage tracker in the background service worker
#[wasm_bindgen]
pub fn start_background() {
    background::run(TrackerConfig::default());
}

// Inject the remaining-time overlay into a tracked page
#[wasm_bindgen]
pub fn start_overlay() -> Result<(), JsValue> {
    ui::overlay::mount().map_err(|e| JsValue::from_str(&e))
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}

// Start the Yew app for the history page
#[wasm_bindgen]
pub fn start_history() {
    yew::Renderer::<ui::history::HistoryPage>::new().render();
}
