pub mod browser;
pub mod host;
pub mod parse;
pub mod room;
pub mod traits;
pub mod types;

pub use browser::ChromeBrowser;
pub use host::HostExtractor;
pub use room::RoomExtractor;
pub use traits::ItemExtractor;
pub use types::SearchParams;
