//! Course creation form (admin only).

pub mod render;
pub mod update;

use campus_core::api::NewCourse;

pub const REQUIRED_MESSAGE: &str = "Title and description are required.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormField {
    #[default]
    Title,
    Description,
}

impl FormField {
    pub fn toggle(self) -> Self {
        match self {
            FormField::Title => FormField::Description,
            FormField::Description => FormField::Title,
        }
    }
}

#[derive(Debug, Default)]
pub struct CourseFormState {
    pub title: String,
    pub description: String,
    pub field: FormField,
    pub submitting: bool,
    pub error: Option<String>,
}

impl CourseFormState {
    pub fn current_mut(&mut self) -> &mut String {
        match self.field {
            FormField::Title => &mut self.title,
            FormField::Description => &mut self.description,
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        self.current_mut().push(ch);
    }

    /// Pastes text; newlines become spaces since both fields are single-line.
    pub fn insert_str(&mut self, text: &str) {
        let cleaned: String = text
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        self.current_mut().push_str(&cleaned);
    }

    pub fn backspace(&mut self) {
        self.current_mut().pop();
    }

    /// The payload to submit, or `None` if a field is blank.
    pub fn to_new_course(&self) -> Option<NewCourse> {
        let course = NewCourse {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
        };
        course.is_valid().then_some(course)
    }

    /// Empties both fields after a successful submission.
    pub fn clear(&mut self) {
        self.title.clear();
        self.description.clear();
        self.field = FormField::Title;
        self.error = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
