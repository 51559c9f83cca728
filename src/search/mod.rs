//! Discovery of listing ids through a map search that caps how many results
//! it will show for one view.

pub mod probe;
pub mod reader;
pub mod region;
pub mod splitter;
pub mod stability;
pub mod view;

#[cfg(test)]
pub mod testing;

pub use probe::ResultCount;
pub use region::{Point, Region};
pub use splitter::RegionSplitter;
pub use view::{SearchView, ZoomDirection};
