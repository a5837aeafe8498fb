//! Timing-source parsing.
mod common;

use std::fs;

use evoked::{events_from_table, read_events, Error, EventId, TrialTable};

use common::tmp_path;

#[test]
fn timing_files_to_per_run_events() {
    let left = tmp_path("left.1D");
    let right = tmp_path("right.1D");
    // Two runs each; the second condition never occurs in run 2.
    fs::write(&left, "10 30\n15 35\n").unwrap();
    fs::write(&right, "20\n*\n").unwrap();

    let (events, event_id) = read_events(&[
        ("Physical/Left".to_string(), left.clone()),
        ("Physical/Right".to_string(), right.clone()),
    ])
    .unwrap();

    assert_eq!(events.len(), 2);
    // Run 1: onsets sorted across conditions, labels follow file order.
    let r1 = &events[0];
    assert_eq!(r1.nrows(), 3);
    assert_eq!(r1.column(0).to_vec(), vec![10.0, 20.0, 30.0]);
    assert_eq!(r1.column(2).to_vec(), vec![1.0, 2.0, 1.0]);
    // Run 2: the starred condition contributes nothing.
    let r2 = &events[1];
    assert_eq!(r2.column(0).to_vec(), vec![15.0, 35.0]);
    assert_eq!(r2.column(2).to_vec(), vec![1.0, 1.0]);

    let pairs: Vec<(&str, i64)> = event_id.iter().collect();
    assert_eq!(pairs, [("Physical/Left", 1), ("Physical/Right", 2)]);

    fs::remove_file(left).unwrap();
    fs::remove_file(right).unwrap();
}

#[test]
fn blank_lines_are_skipped() {
    let f = tmp_path("blank.1D");
    fs::write(&f, "\n10 30\n\n15\n\n").unwrap();
    let (events, _) = read_events(&[("A".to_string(), f.clone())]).unwrap();
    assert_eq!(events.len(), 2);
    fs::remove_file(f).unwrap();
}

#[test]
fn run_count_disagreement_is_malformed() {
    let a = tmp_path("two_runs.1D");
    let b = tmp_path("three_runs.1D");
    fs::write(&a, "1\n2\n").unwrap();
    fs::write(&b, "1\n2\n3\n").unwrap();
    let err = read_events(&[("A".to_string(), a.clone()), ("B".to_string(), b.clone())])
        .unwrap_err();
    assert!(matches!(err, Error::MalformedTimingSource(_)), "got {err}");
    fs::remove_file(a).unwrap();
    fs::remove_file(b).unwrap();
}

#[test]
fn unparsable_onset_is_malformed() {
    let f = tmp_path("bad_onset.1D");
    fs::write(&f, "10 oops 30\n").unwrap();
    let err = read_events(&[("A".to_string(), f.clone())]).unwrap_err();
    assert!(matches!(err, Error::MalformedTimingSource(_)), "got {err}");
    fs::remove_file(f).unwrap();
}

#[test]
fn trial_table_end_to_end() {
    let table = TrialTable::from_tsv(
        "run\tonset\tdur\tmodality\tside\n\
         r1\t4.0\t2.0\tPhysical\tLeft\n\
         r1\t2.0\t2.0\tImagined\tRight\n\
         r2\t1.0\t2.0\tPhysical\tLeft\n",
    )
    .unwrap();
    let (events, event_id) = events_from_table(
        &table,
        "run",
        "onset",
        &["modality", "side"],
        Some("dur"),
        None,
    )
    .unwrap();

    // Runs in first-appearance order, rows sorted by onset within a run.
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].column(0).to_vec(), vec![2.0, 4.0]);
    assert_eq!(events[0].column(1).to_vec(), vec![2.0, 2.0]);
    assert_eq!(events[1].nrows(), 1);

    // Derived dictionary: full cartesian product, last factor fastest.
    let names: Vec<&str> = event_id.iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        [
            "Physical/Left",
            "Physical/Right",
            "Imagined/Left",
            "Imagined/Right"
        ]
    );
}

#[test]
fn explicit_dictionary_rejects_unknown_combination() {
    let table = TrialTable::from_tsv(
        "run\tonset\tcond\n\
         r1\t1.0\tA\n\
         r1\t2.0\tB\n",
    )
    .unwrap();
    let id = EventId::from_pairs([("A", 1)]);
    let err =
        events_from_table(&table, "run", "onset", &["cond"], None, Some(id)).unwrap_err();
    assert!(matches!(err, Error::MalformedTimingSource(_)), "got {err}");
}
