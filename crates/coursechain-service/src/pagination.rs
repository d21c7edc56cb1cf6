//! Page assembly over concurrent course lookups.
//!
//! The total count and the individual courses are read at different
//! instants. Lookups that fail are dropped, so a page can come back shorter
//! than `limit` instead of failing as a whole.

use coursechain_core::{CourseError, CoursePage, CourseRecord, PageRequest};
use futures::stream::{self, StreamExt};

use crate::queries::CourseReader;

pub async fn list_courses(
    reader: &CourseReader,
    req: PageRequest,
    max_concurrent: usize,
) -> Result<CoursePage, CourseError> {
    req.validate()?;
    let total = reader.course_count().await?;

    let items: Vec<CourseRecord> = match req.id_range(total) {
        Some(ids) => {
            stream::iter(ids)
                .map(|id| async move { (id, reader.course(id).await) })
                .buffered(max_concurrent.max(1))
                .filter_map(|(id, res)| async move {
                    match res {
                        Ok(course) => Some(course),
                        Err(e) => {
                            tracing::warn!(id, error = %e, "dropping course from page");
                            None
                        }
                    }
                })
                .collect()
                .await
        }
        None => Vec::new(),
    };

    tracing::debug!(
        page = req.page,
        limit = req.limit,
        total,
        returned = items.len(),
        "listed courses"
    );

    Ok(CoursePage {
        items,
        page: req.page,
        limit: req.limit,
        total,
        total_pages: req.total_pages(total),
        has_next: req.has_next(total),
        has_prev: req.has_prev(),
    })
}
