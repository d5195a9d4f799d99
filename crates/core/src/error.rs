use thiserror::Error;

use crate::model::{CurriculumError, ParseIdError, UnknownCategory};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Category(#[from] UnknownCategory),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
