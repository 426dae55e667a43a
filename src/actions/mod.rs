mod browser;

pub use browser::open_in_browser;
