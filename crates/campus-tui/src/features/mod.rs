pub mod course_form;
pub mod courses;
pub mod shell;
