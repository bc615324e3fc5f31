pub use self::{level::*, skill::*};

pub(crate) mod level;
pub(crate) mod skill;
