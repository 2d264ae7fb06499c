//! Course list feature.
//!
//! Shows the courses visible to students and admins. Any error replaces the
//! previously loaded data.

pub mod render;
pub mod update;

use campus_core::api::Course;

/// Shown instead of an empty list.
pub const EMPTY_MESSAGE: &str = "No courses available.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CourseList {
    #[default]
    NotLoaded,
    Loaded(Vec<Course>),
    Failed(String),
}

#[derive(Debug, Default)]
pub struct CoursesState {
    pub list: CourseList,
    pub loading: bool,
    pub selected: usize,
}

impl CoursesState {
    pub fn courses(&self) -> &[Course] {
        match &self.list {
            CourseList::Loaded(courses) => courses,
            CourseList::NotLoaded | CourseList::Failed(_) => &[],
        }
    }

    pub fn selected_course(&self) -> Option<&Course> {
        self.courses().get(self.selected)
    }

    pub fn select_next(&mut self) {
        let len = self.courses().len();
        if len > 0 {
            self.selected = (self.selected + 1).min(len - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
