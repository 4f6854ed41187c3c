#[cfg(test)]
mod canvas;
mod colormap;
mod debug;

pub mod buses;
pub mod load;
pub mod load_plot;
pub mod map;
pub mod topology;

pub use buses::*;
pub use colormap::*;
pub use load::*;
pub use load_plot::*;
pub use map::*;
pub use topology::*;
