//! Course command handlers.

use anyhow::{Result, anyhow, bail};
use campus_core::api::{ApiOperation, Course, NewCourse};
use campus_core::config::Config;
use campus_tui::features::course_form::REQUIRED_MESSAGE;
use campus_tui::features::course_form::render::ADMIN_ONLY_TEXT;
use campus_tui::features::courses::EMPTY_MESSAGE;
use campus_tui::features::courses::render::ACCESS_DENIED_TEXT;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};

use super::require_session;

pub async fn list(config: &Config) -> Result<()> {
    let (store, session) = require_session(config).await?;
    if !session.access().courses {
        bail!(ACCESS_DENIED_TEXT);
    }
    let token = session.token.as_deref().unwrap_or_default();

    let courses = store
        .api()
        .list_courses(token)
        .await
        .map_err(|err| anyhow!(err.user_message(ApiOperation::ListCourses)))?;

    if courses.is_empty() {
        println!("{EMPTY_MESSAGE}");
    } else {
        println!("{}", course_table(&courses));
    }
    Ok(())
}

pub async fn create(config: &Config, title: &str, description: &str) -> Result<()> {
    let course = NewCourse {
        title: title.trim().to_string(),
        description: description.trim().to_string(),
    };
    if !course.is_valid() {
        bail!(REQUIRED_MESSAGE);
    }

    let (store, session) = require_session(config).await?;
    if !session.access().manage_courses {
        bail!(ADMIN_ONLY_TEXT);
    }
    let token = session.token.as_deref().unwrap_or_default();

    let created = store
        .api()
        .create_course(token, &course)
        .await
        .map_err(|err| anyhow!(err.user_message(ApiOperation::CreateCourse)))?;

    println!("Course created (id={}): {}", created.id, created.title);
    Ok(())
}

fn course_table(courses: &[Course]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Title", "Description"]);
    for course in courses {
        table.add_row(vec![
            course.id.to_string(),
            course.title.clone(),
            course.description.clone().unwrap_or_default(),
        ]);
    }
    table
}
