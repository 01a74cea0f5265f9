pub mod compare;
pub mod page;

pub use compare::{compare_pages, PageCompare};
pub use page::{Attender, Cabinet, Day, Format, Formation, Page, PageKind, Range, Subject, Weekday};
