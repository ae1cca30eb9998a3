//! Pooled data-access context over the School schema.
//!
//! All methods are blocking; HTTP handlers call them from
//! `tokio::task::spawn_blocking`.

use crate::pool::DbPool;
use rusqlite::{ErrorCode, OptionalExtension, Row};
use school_types::{Course, NewCourse, NewStudent, Student};
use thiserror::Error;

/// Errors returned by [`SchoolDbContext`] operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// No connection could be checked out of the pool.
    #[error("database connection unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    /// A write violated a uniqueness constraint.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other SQLite failure.
    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for ContextError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                ContextError::Conflict(e.to_string())
            }
            _ => ContextError::Database(e),
        }
    }
}

/// Shared handle to the School database.
///
/// Cloning is cheap: clones share the same connection pool.
#[derive(Clone)]
pub struct SchoolDbContext {
    pool: DbPool,
}

const STUDENT_COLUMNS: &str = "Id, FirstName, LastName, Email, EnrollmentDate";
const COURSE_COLUMNS: &str = "Id, Title, Credits";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        enrollment_date: row.get(4)?,
    })
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        title: row.get(1)?,
        credits: row.get(2)?,
    })
}

impl SchoolDbContext {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Returns every student ordered by last name, first name, then id.
    pub fn list_students(&self) -> Result<Vec<Student>, ContextError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {STUDENT_COLUMNS} FROM Students ORDER BY LastName, FirstName, Id"
        ))?;
        let students = stmt
            .query_map([], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    pub fn find_student(&self, id: i64) -> Result<Option<Student>, ContextError> {
        let conn = self.pool.get()?;
        let student = conn
            .query_row(
                &format!("SELECT {STUDENT_COLUMNS} FROM Students WHERE Id = ?1"),
                [id],
                student_from_row,
            )
            .optional()?;
        Ok(student)
    }

    /// Inserts a student and returns it with its assigned id.
    ///
    /// Text fields are stored trimmed. A duplicate email yields
    /// [`ContextError::Conflict`].
    pub fn add_student(&self, new: &NewStudent) -> Result<Student, ContextError> {
        let conn = self.pool.get()?;
        let student = conn.query_row(
            &format!(
                "INSERT INTO Students (FirstName, LastName, Email, EnrollmentDate)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING {STUDENT_COLUMNS}"
            ),
            rusqlite::params![
                new.first_name.trim(),
                new.last_name.trim(),
                new.email.trim(),
                new.enrollment_date.trim(),
            ],
            student_from_row,
        )?;
        tracing::debug!(student_id = student.id, "student added");
        Ok(student)
    }

    /// Deletes a student. Returns `false` if no such student existed.
    pub fn remove_student(&self, id: i64) -> Result<bool, ContextError> {
        let conn = self.pool.get()?;
        let removed = conn.execute("DELETE FROM Students WHERE Id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Returns every course ordered by title.
    pub fn list_courses(&self) -> Result<Vec<Course>, ContextError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COURSE_COLUMNS} FROM Courses ORDER BY Title"
        ))?;
        let courses = stmt
            .query_map([], course_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    pub fn find_course(&self, id: i64) -> Result<Option<Course>, ContextError> {
        let conn = self.pool.get()?;
        let course = conn
            .query_row(
                &format!("SELECT {COURSE_COLUMNS} FROM Courses WHERE Id = ?1"),
                [id],
                course_from_row,
            )
            .optional()?;
        Ok(course)
    }

    /// Inserts a course. A duplicate title yields [`ContextError::Conflict`].
    pub fn add_course(&self, new: &NewCourse) -> Result<Course, ContextError> {
        let conn = self.pool.get()?;
        let course = conn.query_row(
            &format!(
                "INSERT INTO Courses (Title, Credits) VALUES (?1, ?2)
                 RETURNING {COURSE_COLUMNS}"
            ),
            rusqlite::params![new.title.trim(), new.credits],
            course_from_row,
        )?;
        tracing::debug!(course_id = course.id, "course added");
        Ok(course)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, upgrade, ConnectionSettings, DbRuntimeSettings};
    use tempfile::TempDir;

    // A file-backed database so every pooled connection sees the same data.
    fn setup() -> (TempDir, SchoolDbContext) {
        let dir = tempfile::tempdir().unwrap();
        let settings =
            ConnectionSettings::for_path(dir.path().join("school.db").display().to_string());
        let pool = create_pool(&settings, DbRuntimeSettings::default());
        upgrade(&pool.get().unwrap()).unwrap();
        (dir, SchoolDbContext::new(pool))
    }

    fn ada() -> NewStudent {
        NewStudent {
            first_name: " Ada ".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.org".to_string(),
            enrollment_date: "2024-09-01".to_string(),
        }
    }

    #[test]
    fn add_then_find_student() {
        let (_dir, ctx) = setup();
        let created = ctx.add_student(&ada()).unwrap();
        assert_eq!(created.first_name, "Ada");

        let found = ctx.find_student(created.id).unwrap();
        assert_eq!(found, Some(created));
        assert_eq!(ctx.find_student(9_999).unwrap(), None);
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let (_dir, ctx) = setup();
        ctx.add_student(&ada()).unwrap();
        let err = ctx.add_student(&ada()).unwrap_err();
        assert!(matches!(err, ContextError::Conflict(_)), "got {err:?}");
    }

    #[test]
    fn remove_student_reports_whether_a_row_was_deleted() {
        let (_dir, ctx) = setup();
        let created = ctx.add_student(&ada()).unwrap();
        assert!(ctx.remove_student(created.id).unwrap());
        assert!(!ctx.remove_student(created.id).unwrap());
        assert!(ctx.list_students().unwrap().is_empty());
    }

    #[test]
    fn seeded_courses_are_listed_by_title() {
        let (_dir, ctx) = setup();
        let titles: Vec<String> = ctx
            .list_courses()
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Chemistry", "Literature", "Microeconomics"]);
    }

    #[test]
    fn add_course_and_reject_duplicate_title() {
        let (_dir, ctx) = setup();
        let course = ctx
            .add_course(&NewCourse {
                title: "Calculus".to_string(),
                credits: 4,
            })
            .unwrap();
        assert_eq!(ctx.find_course(course.id).unwrap(), Some(course));

        let err = ctx
            .add_course(&NewCourse {
                title: "Chemistry".to_string(),
                credits: 1,
            })
            .unwrap_err();
        assert!(matches!(err, ContextError::Conflict(_)));
    }
}
