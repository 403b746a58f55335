pub mod job;
pub mod resume;

pub use job::{JobDescription, JobRequirements};
pub use resume::{BulletRef, ContactInfo, Resume, Section, SectionContent, SectionKind};
