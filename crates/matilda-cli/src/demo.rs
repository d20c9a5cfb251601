//! Bundled demo databases (university schema).
//!
//! The imperfect variant seeds referential violations on purpose: 5
//! enrollment rows and 3 advisor rows reference students that do not exist,
//! so discovery finds approximate rules with confidence strictly below 1.
//! The perfect variant writes the same data minus the violating rows.

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use rusqlite::{params, Connection};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoKind {
    #[value(name = "perfect_database")]
    Perfect,
    #[value(name = "imperfect_database")]
    Imperfect,
}

impl DemoKind {
    pub fn file_name(self) -> &'static str {
        match self {
            DemoKind::Perfect => "university_perfect_database.db",
            DemoKind::Imperfect => "university_imperfect_database.db",
        }
    }
}

/// Student ids used by violating rows; none of them exist in `student`.
const FAKE_STUDENTS: [i64; 5] = [999, 998, 997, 996, 995];

pub fn create_demo_database(kind: DemoKind, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if path.exists() {
        std::fs::remove_file(path).with_context(|| format!("removing stale {}", path.display()))?;
    }

    let conn = Connection::open(path).with_context(|| format!("creating {}", path.display()))?;
    // Violations must be insertable.
    conn.execute_batch("PRAGMA foreign_keys = OFF")?;

    conn.execute_batch(
        "CREATE TABLE department (
             dept_id INTEGER PRIMARY KEY,
             dept_name TEXT NOT NULL
         );
         CREATE TABLE professor (
             prof_id INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             dept_id INTEGER,
             FOREIGN KEY(dept_id) REFERENCES department(dept_id)
         );
         CREATE TABLE student (
             student_id INTEGER PRIMARY KEY,
             name TEXT NOT NULL,
             year INTEGER,
             dept_id INTEGER,
             FOREIGN KEY(dept_id) REFERENCES department(dept_id)
         );
         CREATE TABLE course (
             course_id INTEGER PRIMARY KEY,
             title TEXT NOT NULL,
             dept_id INTEGER,
             FOREIGN KEY(dept_id) REFERENCES department(dept_id)
         );
         CREATE TABLE enrollment (
             enrollment_id INTEGER PRIMARY KEY,
             student_id INTEGER,
             course_id INTEGER,
             FOREIGN KEY(student_id) REFERENCES student(student_id),
             FOREIGN KEY(course_id) REFERENCES course(course_id)
         );
         CREATE TABLE advisor (
             advisor_id INTEGER PRIMARY KEY,
             prof_id INTEGER,
             student_id INTEGER,
             FOREIGN KEY(prof_id) REFERENCES professor(prof_id),
             FOREIGN KEY(student_id) REFERENCES student(student_id)
         );",
    )?;

    conn.execute_batch(
        "INSERT INTO department VALUES (1, 'CS'), (2, 'Math');",
    )?;

    for dept in 1..=2i64 {
        for p in 1..=5i64 {
            let prof_id = (dept - 1) * 5 + p;
            conn.execute(
                "INSERT INTO professor VALUES (?1, ?2, ?3)",
                params![prof_id, format!("Prof_Dept{dept}_{p}"), dept],
            )?;
        }
    }

    // 50 students, 25 per department.
    for s in 1..=50i64 {
        let dept = 1 + (s - 1) / 25;
        conn.execute(
            "INSERT INTO student VALUES (?1, ?2, ?3, ?4)",
            params![s, format!("Student_{dept}_{s}"), 1 + (s % 4), dept],
        )?;
    }

    for dept in 1..=2i64 {
        for c in 1..=5i64 {
            let course_id = (dept - 1) * 5 + c;
            conn.execute(
                "INSERT INTO course VALUES (?1, ?2, ?3)",
                params![course_id, format!("Course_Dept{dept}_{c}"), dept],
            )?;
        }
    }

    // 76 enrollments from real students: one course for everyone, a second
    // one for the first 26 students.
    let mut enrollment_id = 0i64;
    for s in 1..=50i64 {
        enrollment_id += 1;
        conn.execute(
            "INSERT INTO enrollment VALUES (?1, ?2, ?3)",
            params![enrollment_id, s, (s - 1) % 10 + 1],
        )?;
    }
    for s in 1..=26i64 {
        enrollment_id += 1;
        conn.execute(
            "INSERT INTO enrollment VALUES (?1, ?2, ?3)",
            params![enrollment_id, s, (s + 4) % 10 + 1],
        )?;
    }

    // 45 advisor rows: every student except ids divisible by 10.
    let mut advisor_id = 0i64;
    for s in 1..=50i64 {
        if s % 10 == 0 {
            continue;
        }
        advisor_id += 1;
        conn.execute(
            "INSERT INTO advisor VALUES (?1, ?2, ?3)",
            params![advisor_id, (s - 1) % 10 + 1, s],
        )?;
    }

    if kind == DemoKind::Imperfect {
        // 5 enrollment violations (one per fake student) → 81 rows total,
        // 76 of which resolve to a real student.
        for fake in FAKE_STUDENTS {
            enrollment_id += 1;
            conn.execute(
                "INSERT INTO enrollment VALUES (?1, ?2, ?3)",
                params![enrollment_id, fake, 1],
            )?;
        }
        // 3 advisor violations → 48 rows total, 45 valid.
        for fake in &FAKE_STUDENTS[..3] {
            advisor_id += 1;
            conn.execute(
                "INSERT INTO advisor VALUES (?1, ?2, ?3)",
                params![advisor_id, 1, fake],
            )?;
        }
    }

    Ok(())
}
