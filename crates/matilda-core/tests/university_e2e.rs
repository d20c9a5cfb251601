//! End-to-end discovery runs against the university fixture.
//!
//! The fixture seeds referential violations on purpose: 81 enrollment rows
//! of which 76 resolve to a real student, and 48 advisor rows of which 45
//! do. Discovery over it must surface the two inclusion dependencies as
//! approximate TGDs with exactly those counts.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tempfile::TempDir;

use matilda_core::prune::RulePruner;
use matilda_core::rule::{Atom, Rule, Term, VarId};
use matilda_core::{discover, report, CancelReason, Config, RunStatus};

fn university_db(dir: &Path) -> PathBuf {
    let path = dir.join("university.db");
    let conn = Connection::open(&path).expect("create fixture db");
    conn.execute_batch("PRAGMA foreign_keys = OFF").expect("pragma");
    conn.execute_batch(
        "CREATE TABLE department (dept_id INTEGER PRIMARY KEY, dept_name TEXT NOT NULL);
         CREATE TABLE professor (prof_id INTEGER PRIMARY KEY, name TEXT NOT NULL, dept_id INTEGER);
         CREATE TABLE student (student_id INTEGER PRIMARY KEY, name TEXT NOT NULL, year INTEGER, dept_id INTEGER);
         CREATE TABLE course (course_id INTEGER PRIMARY KEY, title TEXT NOT NULL, dept_id INTEGER);
         CREATE TABLE enrollment (enrollment_id INTEGER PRIMARY KEY, student_id INTEGER, course_id INTEGER);
         CREATE TABLE advisor (advisor_id INTEGER PRIMARY KEY, prof_id INTEGER, student_id INTEGER);
         INSERT INTO department VALUES (1, 'CS'), (2, 'Math');",
    )
    .expect("schema");

    for dept in 1..=2i64 {
        for p in 1..=5i64 {
            conn.execute(
                "INSERT INTO professor VALUES (?1, ?2, ?3)",
                params![(dept - 1) * 5 + p, format!("Prof_Dept{dept}_{p}"), dept],
            )
            .expect("professor");
        }
    }
    for s in 1..=50i64 {
        let dept = 1 + (s - 1) / 25;
        conn.execute(
            "INSERT INTO student VALUES (?1, ?2, ?3, ?4)",
            params![s, format!("Student_{dept}_{s}"), 1 + (s % 4), dept],
        )
        .expect("student");
    }
    for dept in 1..=2i64 {
        for c in 1..=5i64 {
            conn.execute(
                "INSERT INTO course VALUES (?1, ?2, ?3)",
                params![(dept - 1) * 5 + c, format!("Course_Dept{dept}_{c}"), dept],
            )
            .expect("course");
        }
    }

    // 76 valid enrollments + 5 referencing non-existent students = 81.
    let mut enrollment_id = 0i64;
    for s in 1..=50i64 {
        enrollment_id += 1;
        conn.execute(
            "INSERT INTO enrollment VALUES (?1, ?2, ?3)",
            params![enrollment_id, s, (s - 1) % 10 + 1],
        )
        .expect("enrollment");
    }
    for s in 1..=26i64 {
        enrollment_id += 1;
        conn.execute(
            "INSERT INTO enrollment VALUES (?1, ?2, ?3)",
            params![enrollment_id, s, (s + 4) % 10 + 1],
        )
        .expect("enrollment");
    }
    for fake in [999i64, 998, 997, 996, 995] {
        enrollment_id += 1;
        conn.execute(
            "INSERT INTO enrollment VALUES (?1, ?2, ?3)",
            params![enrollment_id, fake, 1],
        )
        .expect("enrollment violation");
    }

    // 45 valid advisor rows + 3 violations = 48.
    let mut advisor_id = 0i64;
    for s in 1..=50i64 {
        if s % 10 == 0 {
            continue;
        }
        advisor_id += 1;
        conn.execute(
            "INSERT INTO advisor VALUES (?1, ?2, ?3)",
            params![advisor_id, (s - 1) % 10 + 1, s],
        )
        .expect("advisor");
    }
    for fake in [999i64, 998, 997] {
        advisor_id += 1;
        conn.execute(
            "INSERT INTO advisor VALUES (?1, ?2, ?3)",
            params![advisor_id, 1, fake],
        )
        .expect("advisor violation");
    }

    path
}

fn approximate_config() -> Config {
    let mut config = Config::default();
    config.algorithm.nb_occurrence = 2;
    config.algorithm.max_table = 2;
    config.algorithm.max_vars = 4;
    config.algorithm.confidence_threshold = 0.9;
    config
}

#[test]
fn discovers_enrollment_student_inclusion() {
    let dir = TempDir::new().expect("tempdir");
    let db = university_db(dir.path());
    let outcome = discover(&db, &approximate_config()).expect("discover");

    assert_eq!(outcome.status, RunStatus::Success);
    let rule = outcome
        .rules
        .iter()
        .find(|r| r.tgd_string == "enrollment(_, x, _) → ∃y, z, u. student(x, y, z, u)")
        .unwrap_or_else(|| panic!("missing enrollment→student rule in {:#?}", outcome.rules));
    assert_eq!(rule.support, 76);
    assert!((rule.confidence - 76.0 / 81.0).abs() < 1e-9);
}

#[test]
fn discovers_advisor_student_inclusion() {
    let dir = TempDir::new().expect("tempdir");
    let db = university_db(dir.path());
    let outcome = discover(&db, &approximate_config()).expect("discover");

    let rule = outcome
        .rules
        .iter()
        .find(|r| r.tgd_string == "advisor(_, _, x) → ∃y, z, u. student(x, y, z, u)")
        .unwrap_or_else(|| panic!("missing advisor→student rule in {:#?}", outcome.rules));
    assert_eq!(rule.support, 45);
    assert!((rule.confidence - 45.0 / 48.0).abs() < 1e-9);
    assert!((rule.confidence - 0.9375).abs() < 1e-9);
}

#[test]
fn every_emitted_rule_honors_the_bounds() {
    let dir = TempDir::new().expect("tempdir");
    let db = university_db(dir.path());
    let config = approximate_config();
    let outcome = discover(&db, &config).expect("discover");

    assert!(!outcome.rules.is_empty());
    for rule in &outcome.rules {
        assert!(
            rule.body.len() + rule.head.len() <= config.algorithm.max_table as usize,
            "too many atoms: {}",
            rule.tgd_string
        );
        assert!(
            rule.support >= u64::from(config.algorithm.nb_occurrence),
            "support floor violated: {}",
            rule.tgd_string
        );
        assert!(
            rule.confidence + 1e-9 >= config.algorithm.confidence_threshold,
            "confidence floor violated: {}",
            rule.tgd_string
        );
    }
}

#[test]
fn unreachable_support_floor_is_empty_success() {
    let dir = TempDir::new().expect("tempdir");
    let db = university_db(dir.path());
    let mut config = approximate_config();
    config.algorithm.nb_occurrence = 100;

    let outcome = discover(&db, &config).expect("discover");
    assert_eq!(outcome.status, RunStatus::Success);
    assert!(outcome.rules.is_empty());
}

#[test]
fn exhausted_time_budget_finalizes_as_partial() {
    let dir = TempDir::new().expect("tempdir");
    let db = university_db(dir.path());
    let mut config = approximate_config();
    // A zero budget trips the monitor at its first poll, which exercises
    // the same clean-stop path as a timeout mid-enumeration.
    config.monitor.timeout = 0.0;

    let outcome = discover(&db, &config).expect("discover");
    assert_eq!(outcome.status, RunStatus::Partial);
    assert_eq!(outcome.cancel_reason, Some(CancelReason::Timeout));
    assert!(outcome.rules.len() as u64 <= outcome.candidates_enumerated + 1);
    for rule in &outcome.rules {
        assert!(rule.support >= 2);
    }
}

#[test]
fn reruns_are_byte_identical_except_timing() {
    let dir = TempDir::new().expect("tempdir");
    let db = university_db(dir.path());
    let config = approximate_config();

    let first = discover(&db, &config).expect("first run");
    let second = discover(&db, &config).expect("second run");

    // Pin the timing field; everything else must match byte for byte.
    let out_a = dir.path().join("a");
    let out_b = dir.path().join("b");
    let path_a = report::write_results_json(&out_a, &db, &first, 0.0).expect("write a");
    let path_b = report::write_results_json(&out_b, &db, &second, 0.0).expect("write b");

    let text_a = std::fs::read_to_string(path_a).expect("read a");
    let text_b = std::fs::read_to_string(path_b).expect("read b");
    assert_eq!(text_a, text_b);
}

#[test]
fn output_contains_no_duplicate_rules() {
    let dir = TempDir::new().expect("tempdir");
    let db = university_db(dir.path());
    let outcome = discover(&db, &approximate_config()).expect("discover");

    let mut strings: Vec<&str> = outcome.rules.iter().map(|r| r.tgd_string.as_str()).collect();
    let before = strings.len();
    strings.sort_unstable();
    strings.dedup();
    assert_eq!(before, strings.len());
}

#[test]
fn candidates_identical_up_to_renaming_collapse() {
    let v = |n: u32| Term::Var(VarId(n));
    let mut pruner = RulePruner::new(6);

    let first = Rule::new(
        vec![Atom::new("enrollment", vec![Term::Anon, v(0), Term::Anon])],
        vec![Atom::new("student", vec![v(0), v(1), v(2), v(3)])],
    );
    let renamed = Rule::new(
        vec![Atom::new("enrollment", vec![Term::Anon, v(5), Term::Anon])],
        vec![Atom::new("student", vec![v(5), v(9), v(7), v(8)])],
    );

    assert!(pruner.pre_validate(&first));
    assert!(!pruner.pre_validate(&renamed));
}
