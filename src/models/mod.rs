pub mod assessment;
pub mod enums;
pub mod evidence;
pub mod founding;
pub mod progress;
pub mod ratio;

pub use assessment::*;
pub use enums::*;
pub use evidence::*;
pub use founding::*;
pub use progress::*;
pub use ratio::*;
