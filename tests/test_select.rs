//! Hierarchical label selection and axis selectors.
mod common;

use evoked::{extract_epochs, Error, EventId, Selector};

use common::{event_rows, no_baseline_cfg, ramp_raw};

fn four_condition_epochs() -> evoked::Epochs {
    let raw = ramp_raw(3, 200, 1.0);
    let ev = event_rows(&[
        (20.0, 0.0, 1),
        (40.0, 0.0, 2),
        (60.0, 0.0, 3),
        (80.0, 0.0, 4),
        (100.0, 0.0, 1),
    ]);
    let id = EventId::from_pairs([
        ("Physical/Left", 1),
        ("Physical/Right", 2),
        ("Imagined/Left", 3),
        ("Imagined/Right", 4),
    ]);
    extract_epochs(&raw, &ev, Some(id), &no_baseline_cfg(-2.0, 6.0, 1.0)).unwrap()
}

#[test]
fn partial_label_matches_every_branch() {
    let epochs = four_condition_epochs();
    let phys = epochs.pick_labels(&["Physical"]).unwrap();
    assert_eq!(phys.labels(), vec![1, 2, 1]);
    // The dictionary is pruned to what survived, in original order.
    let names: Vec<&str> = phys.event_id().iter().map(|(n, _)| n).collect();
    assert_eq!(names, ["Physical/Left", "Physical/Right"]);

    let left = epochs.pick_labels(&["Left"]).unwrap();
    assert_eq!(left.labels(), vec![1, 3, 1]);

    // Token order in the query does not matter.
    let exact = epochs.pick_labels(&["Left/Physical"]).unwrap();
    assert_eq!(exact.labels(), vec![1, 1]);
}

#[test]
fn multiple_labels_are_or_combined() {
    let epochs = four_condition_epochs();
    let sel = epochs.pick_labels(&["Physical/Left", "Imagined/Right"]).unwrap();
    assert_eq!(sel.labels(), vec![1, 4, 1]);
    assert_eq!(sel.info().condition.as_deref(), Some("Physical/Left | Imagined/Right"));
}

#[test]
fn unmatched_label_yields_empty_selection() {
    let epochs = four_condition_epochs();
    let none = epochs.pick_labels(&["Auditory"]).unwrap();
    assert_eq!(none.n_events(), 0);
    assert!(none.event_id().is_empty());
    // Still structurally valid for further selection.
    assert_eq!(none.n_features(), 3);
}

#[test]
fn index_and_mask_selection() {
    let epochs = four_condition_epochs();
    let byidx = epochs
        .pick(&Selector::Indices(vec![0, 2]), &Selector::All, &Selector::All)
        .unwrap();
    assert_eq!(byidx.labels(), vec![1, 3]);

    let bymask = epochs
        .pick(
            &Selector::All,
            &Selector::Mask(vec![true, false, true]),
            &Selector::All,
        )
        .unwrap();
    assert_eq!(bymask.n_features(), 2);

    // Selection owns fresh tensors; the source is untouched.
    assert_eq!(epochs.n_features(), 3);
    assert_eq!(epochs.n_events(), 5);
}

#[test]
fn time_range_selection_is_inclusive() {
    let epochs = four_condition_epochs();
    let window = epochs
        .pick(&Selector::All, &Selector::All, &Selector::Range(0.0, 3.0))
        .unwrap();
    assert_eq!(window.times(), &[0.0, 1.0, 2.0, 3.0]);
    assert_eq!(window.info().tmin, 0.0);
    assert_eq!(window.info().tmax, 3.0);
}

#[test]
fn selectors_are_axis_checked() {
    let epochs = four_condition_epochs();
    let err = epochs
        .pick(&Selector::Range(0.0, 1.0), &Selector::All, &Selector::All)
        .unwrap_err();
    assert!(matches!(err, Error::ShapeInvariantViolation(_)), "got {err}");

    let err = epochs
        .pick(
            &Selector::All,
            &Selector::Labels(vec!["Physical".into()]),
            &Selector::All,
        )
        .unwrap_err();
    assert!(matches!(err, Error::ShapeInvariantViolation(_)), "got {err}");

    let err = epochs
        .pick(&Selector::Indices(vec![99]), &Selector::All, &Selector::All)
        .unwrap_err();
    assert!(matches!(err, Error::ShapeInvariantViolation(_)), "got {err}");

    let err = epochs
        .pick(&Selector::All, &Selector::Mask(vec![true]), &Selector::All)
        .unwrap_err();
    assert!(matches!(err, Error::ShapeInvariantViolation(_)), "got {err}");
}

#[test]
fn selection_commutes_with_concatenation() {
    let raw = ramp_raw(1, 200, 1.0);
    let id = EventId::from_pairs([("Physical/Left", 1), ("Imagined/Left", 2)]);
    let cfg = no_baseline_cfg(-2.0, 6.0, 1.0);
    let ev1 = event_rows(&[(20.0, 0.0, 1), (40.0, 0.0, 2)]);
    let ev2 = event_rows(&[(30.0, 0.0, 2), (50.0, 0.0, 1)]);
    let a = extract_epochs(&raw, &ev1, Some(id.clone()), &cfg).unwrap();
    let b = extract_epochs(&raw, &ev2, Some(id), &cfg).unwrap();

    let concat_then_select = evoked::concatenate_epochs(&[a.clone(), b.clone()])
        .unwrap()
        .pick_labels(&["Physical"])
        .unwrap();
    let select_then_concat = evoked::concatenate_epochs(&[
        a.pick_labels(&["Physical"]).unwrap(),
        b.pick_labels(&["Physical"]).unwrap(),
    ])
    .unwrap();

    assert_eq!(concat_then_select.data(), select_then_concat.data());
    assert_eq!(concat_then_select.labels(), select_then_concat.labels());
    assert_eq!(
        concat_then_select.event_id(),
        select_then_concat.event_id()
    );
}

#[test]
fn drop_events_prunes_like_selection() {
    let epochs = four_condition_epochs();
    // Drop everything except the two Physical/Left rows.
    let kept = epochs.drop_events(&[1, 2, 3]).unwrap();
    assert_eq!(kept.labels(), vec![1, 1]);
    let names: Vec<&str> = kept.event_id().iter().map(|(n, _)| n).collect();
    assert_eq!(names, ["Physical/Left"]);
}
