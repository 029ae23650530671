pub mod assessment;
pub mod chat_turn;
pub mod comparison;
pub mod enums;
pub mod knowledge;
pub mod observation;
pub mod report;

pub use assessment::*;
pub use chat_turn::*;
pub use comparison::*;
pub use enums::*;
pub use knowledge::*;
pub use observation::*;
pub use report::*;
