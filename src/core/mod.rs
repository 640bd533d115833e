// Domain-layer modules and shared errors/models
pub mod readiness {
    pub use crate::readiness::*;
}

pub mod periods {
    pub use crate::periods::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
