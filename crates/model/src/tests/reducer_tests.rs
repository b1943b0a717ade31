use super::*;
use serde_json::json;

use crate::{
    action::{
        add_box2d_label, add_box3d_label, add_label, add_track, change_category, change_label,
        change_shape, delete_label, delete_track, link_labels_to_track, select_labels, submit,
    },
    domain::{DataType, ItemId},
    graph::check_integrity,
    shape::{make_rect, Rect, Vector3D},
    states::{
        make_item, make_label, make_sensor, make_task, make_task_config, LabelParams, TaskStatus,
    },
};

fn state_with_items(count: usize) -> State {
    let items = (0..count)
        .map(|index| make_item(ItemId(index as i64), index))
        .collect();
    let task = make_task(
        make_task_config("reducer", DataType::Image),
        items,
        vec![make_sensor(SensorId(0), "front", DataType::Image, None, None)],
    );
    State::from_task(task)
}

fn step(state: &State, action: Action) -> State {
    apply(state, &action).expect("action applies")
}

fn label(state: &State, id: i64) -> Arc<Label> {
    let (_, label) = state.task.find_label(LabelId(id)).expect("label exists");
    Arc::clone(label)
}

fn child_template(parent: LabelId, shared: &[ShapeId]) -> Label {
    make_label(LabelParams {
        label_type: Some(LabelTypeName::Box2d),
        parent: Some(parent),
        shapes: Some(shared.to_vec()),
        ..LabelParams::default()
    })
}

#[test]
fn add_box2d_label_allocates_ids_from_status() {
    let state = state_with_items(1);
    let next = step(&state, add_box2d_label(0, &[2], 10.0, 20.0, 30.0, 40.0));

    let item = &next.task.items[0];
    assert_eq!(item.labels.len(), 1);
    let label = &item.labels[&LabelId(0)];
    assert_eq!(label.label_type, LabelTypeName::Box2d);
    assert_eq!(label.category, vec![2]);
    assert_eq!(label.order, 0);
    assert_eq!(label.item, ItemId(0));
    assert_eq!(label.shapes, vec![ShapeId(0)]);

    let shape = &item.shapes[&ShapeId(0)];
    assert_eq!(shape.labels, vec![LabelId(0)]);
    let rect = shape.shape.as_rect().expect("rect");
    assert_eq!((rect.x(), rect.y(), rect.w(), rect.h()), (10.0, 20.0, 30.0, 40.0));

    assert_eq!(next.task.status.max_label_id, LabelId(0));
    assert_eq!(next.task.status.max_shape_id, ShapeId(0));
    assert_eq!(next.task.status.max_order, 0);

    assert!(state.task.items[0].labels.is_empty());
    assert_eq!(state.task.status.max_label_id, LabelId::NONE);
}

#[test]
fn untouched_branches_are_shared_with_the_prior_state() {
    let state = state_with_items(2);
    let next = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0));

    assert!(!Arc::ptr_eq(&state.task.items[0], &next.task.items[0]));
    assert!(Arc::ptr_eq(&state.task.items[1], &next.task.items[1]));
    assert!(Arc::ptr_eq(&state.task.config, &next.task.config));
    assert!(Arc::ptr_eq(&state.user, &next.user));
    assert!(Arc::ptr_eq(&state.session, &next.session));
}

#[test]
fn add_label_rejects_out_of_range_items() {
    let state = state_with_items(1);
    let error = apply(&state, &add_box2d_label(4, &[], 0.0, 0.0, 1.0, 1.0)).expect_err("range");
    assert!(matches!(error, ApplyError::Consistency(_)));
}

#[test]
fn add_label_enforces_task_config() {
    let mut task = Task::clone(&state_with_items(1).task);
    let config = Arc::make_mut(&mut task.config);
    config.label_types = vec![LabelTypeName::Box3d];
    config.categories = vec!["car".into(), "person".into()];
    let state = State::from_task(task);

    let error = apply(&state, &add_box2d_label(0, &[0], 0.0, 0.0, 1.0, 1.0)).expect_err("type");
    assert!(matches!(error, ApplyError::Validation(_)));

    let cube = add_box3d_label(0, &[5], Vector3D::default(), Vector3D::new(1.0, 1.0, 1.0), Vector3D::default());
    let error = apply(&state, &cube).expect_err("category");
    assert!(matches!(error, ApplyError::Validation(_)));

    let cube = add_box3d_label(0, &[1], Vector3D::default(), Vector3D::new(1.0, 1.0, 1.0), Vector3D::default());
    let next = step(&state, cube);
    assert_eq!(next.task.items[0].labels[&LabelId(0)].category, vec![1]);
}

#[test]
fn add_label_rejects_shapes_the_label_type_cannot_own() {
    let state = state_with_items(1);
    let template = make_label(LabelParams {
        label_type: Some(LabelTypeName::Box3d),
        ..LabelParams::default()
    });
    let action = add_label(0, template, vec![Rect::default().into()]);
    assert!(matches!(apply(&state, &action), Err(ApplyError::Validation(_))));
}

#[test]
fn add_label_rejects_unknown_sensors_and_structural_fields() {
    let state = state_with_items(1);

    let template = make_label(LabelParams {
        sensors: Some(vec![SensorId(9)]),
        ..LabelParams::default()
    });
    let error = apply(&state, &add_label(0, template, Vec::new())).expect_err("sensor");
    assert_eq!(error, ApplyError::not_found(EntityKind::Sensor, SensorId(9)));

    let template = make_label(LabelParams {
        track: Some(TrackId(0)),
        ..LabelParams::default()
    });
    let error = apply(&state, &add_label(0, template, Vec::new())).expect_err("track");
    assert!(matches!(error, ApplyError::Validation(_)));

    let template = make_label(LabelParams {
        children: Some(vec![LabelId(1)]),
        ..LabelParams::default()
    });
    let error = apply(&state, &add_label(0, template, Vec::new())).expect_err("children");
    assert!(matches!(error, ApplyError::Validation(_)));
}

#[test]
fn child_labels_attach_to_their_parent_and_share_shapes() {
    let state = state_with_items(1);
    let state = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 10.0, 10.0));
    let state = step(
        &state,
        add_label(0, child_template(LabelId(0), &[ShapeId(0)]), Vec::new()),
    );

    assert_eq!(label(&state, 0).children, vec![LabelId(1)]);
    assert_eq!(label(&state, 1).parent, LabelId(0));
    assert_eq!(label(&state, 1).shapes, vec![ShapeId(0)]);
    assert_eq!(label(&state, 1).order, 1);
    assert_eq!(
        state.task.items[0].shapes[&ShapeId(0)].labels,
        vec![LabelId(0), LabelId(1)]
    );
    assert_eq!(check_integrity(&state), Vec::new());

    let error = apply(
        &state,
        &add_label(0, child_template(LabelId(7), &[]), Vec::new()),
    )
    .expect_err("missing parent");
    assert_eq!(error, ApplyError::not_found(EntityKind::Label, LabelId(7)));
}

#[test]
fn change_label_patches_only_editable_fields() {
    let state = state_with_items(1);
    let state = step(&state, add_box2d_label(0, &[1], 0.0, 0.0, 1.0, 1.0));
    let patch = LabelPatch {
        attributes: Some([(0, vec![1])].into_iter().collect()),
        manual: Some(false),
        ..LabelPatch::default()
    };
    let next = step(&state, change_label(LabelId(0), patch));

    let changed = label(&next, 0);
    assert_eq!(changed.category, vec![1]);
    assert_eq!(changed.attributes[&0], vec![1]);
    assert!(!changed.manual);
    assert!(label(&state, 0).manual);

    let error = apply(&next, &change_category(LabelId(9), &[0])).expect_err("missing");
    assert_eq!(error, ApplyError::not_found(EntityKind::Label, LabelId(9)));
}

#[test]
fn change_shape_merges_the_patch_into_the_payload() {
    let state = state_with_items(1);
    let state = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 10.0, 10.0));
    let next = step(&state, change_shape(ShapeId(0), json!({ "x2": 25.0 })).expect("patch"));

    let rect = next.task.items[0].shapes[&ShapeId(0)]
        .shape
        .as_rect()
        .copied()
        .expect("rect");
    assert_eq!(rect.w(), 25.0);
    assert_eq!(rect.h(), 10.0);

    let error = apply(&next, &change_shape(ShapeId(0), json!({ "radius": 3.0 })).expect("patch")).expect_err("field");
    assert!(matches!(error, ApplyError::Validation(_)));

    let error = apply(&next, &change_shape(ShapeId(4), json!({ "x2": 1.0 })).expect("patch")).expect_err("shape");
    assert_eq!(error, ApplyError::not_found(EntityKind::Shape, ShapeId(4)));
}

#[test]
fn delete_label_cascades_to_children_track_and_shapes() {
    let state = state_with_items(2);
    let state = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 10.0, 10.0));
    let box2d = make_label(LabelParams {
        label_type: Some(LabelTypeName::Box2d),
        ..LabelParams::default()
    });
    let state = step(
        &state,
        add_label(0, box2d, vec![Rect::default().into(), Rect::default().into()]),
    );
    let parent = LabelId(1);
    let (shared, exclusive) = (ShapeId(1), ShapeId(2));
    let state = step(&state, add_label(0, child_template(parent, &[shared]), Vec::new()));
    let state = step(
        &state,
        add_label(0, child_template(parent, &[]), vec![Rect::default().into()]),
    );
    assert_eq!(label(&state, 1).children, vec![LabelId(2), LabelId(3)]);

    let state = step(&state, add_box2d_label(1, &[], 0.0, 0.0, 2.0, 2.0));
    let state = step(
        &state,
        link_labels_to_track(&[parent, LabelId(4)], TrackTarget::New),
    );
    let state = step(&state, select_labels(&[parent], &[shared, exclusive]));
    assert_eq!(check_integrity(&state), Vec::new());

    let next = step(&state, delete_label(parent));

    let item = &next.task.items[0];
    assert!(!item.labels.contains_key(&parent));
    assert_eq!(label(&next, 2).parent, LabelId::NONE);
    assert_eq!(label(&next, 3).parent, LabelId::NONE);
    assert_eq!(item.shapes[&shared].labels, vec![LabelId(2)]);
    assert!(!item.shapes.contains_key(&exclusive));
    assert!(item.shapes.contains_key(&ShapeId(0)));
    assert!(item.shapes.contains_key(&ShapeId(3)));

    let track = &next.task.tracks[&TrackId(0)];
    assert_eq!(track.labels.len(), 1);
    assert_eq!(track.labels[&1], LabelId(4));

    assert!(next.user.select.labels.is_empty());
    assert_eq!(next.user.select.shapes, vec![shared]);
    assert_eq!(next.task.status, state.task.status);
    assert_eq!(check_integrity(&next), Vec::new());
}

#[test]
fn delete_label_removes_exclusively_owned_shapes() {
    let state = state_with_items(1);
    let state = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 10.0, 10.0));
    let state = step(&state, select_labels(&[LabelId(0)], &[ShapeId(0)]));
    let next = step(&state, delete_label(LabelId(0)));

    assert!(next.task.items[0].shapes.is_empty());
    assert!(next.user.select.shapes.is_empty());
    assert_eq!(next.task.status.max_shape_id, ShapeId(0));

    let again = step(&next, add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0));
    assert!(again.task.items[0].labels.contains_key(&LabelId(1)));
    assert!(again.task.items[0].shapes.contains_key(&ShapeId(1)));
}

#[test]
fn deleting_the_last_member_removes_the_track() {
    let state = state_with_items(1);
    let state = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0));
    let state = step(&state, link_labels_to_track(&[LabelId(0)], TrackTarget::New));
    let next = step(&state, delete_label(LabelId(0)));
    assert!(next.task.tracks.is_empty());
    assert_eq!(next.task.status.max_track_id, TrackId(0));
}

#[test]
fn linking_keeps_both_sides_of_the_track_in_sync() {
    let state = state_with_items(3);
    let mut state = state;
    for index in 0..3 {
        state = step(&state, add_box2d_label(index, &[], 0.0, 0.0, 1.0, 1.0));
    }
    let state = step(
        &state,
        link_labels_to_track(&[LabelId(0), LabelId(1)], TrackTarget::New),
    );
    assert_eq!(label(&state, 0).track, TrackId(0));
    assert_eq!(label(&state, 1).track, TrackId(0));

    let state = step(
        &state,
        link_labels_to_track(&[LabelId(2)], TrackTarget::Existing(TrackId(0))),
    );
    let track = &state.task.tracks[&TrackId(0)];
    assert_eq!(track.labels.len(), 3);
    assert_eq!(track.labels[&2], LabelId(2));
    assert_eq!(check_integrity(&state), Vec::new());

    let moved = step(
        &state,
        link_labels_to_track(&[LabelId(2)], TrackTarget::New),
    );
    assert_eq!(label(&moved, 2).track, TrackId(1));
    assert_eq!(moved.task.tracks[&TrackId(0)].labels.len(), 2);
    assert_eq!(check_integrity(&moved), Vec::new());
}

#[test]
fn linking_rejects_conflicts_without_touching_the_state() {
    let mut state = state_with_items(2);
    state = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0));
    state = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0));
    state = step(&state, add_box2d_label(1, &[], 0.0, 0.0, 1.0, 1.0));

    let error = apply(
        &state,
        &link_labels_to_track(&[LabelId(0), LabelId(1)], TrackTarget::New),
    )
    .expect_err("same item");
    assert!(matches!(error, ApplyError::Consistency(_)));

    let error = apply(
        &state,
        &link_labels_to_track(&[LabelId(0)], TrackTarget::Existing(TrackId(3))),
    )
    .expect_err("missing track");
    assert!(matches!(error, ApplyError::Consistency(_)));

    state = step(
        &state,
        link_labels_to_track(&[LabelId(0), LabelId(2)], TrackTarget::New),
    );
    let error = apply(
        &state,
        &link_labels_to_track(&[LabelId(1)], TrackTarget::Existing(TrackId(0))),
    )
    .expect_err("slot taken");
    assert!(matches!(error, ApplyError::Consistency(_)));

    let error = apply(&state, &link_labels_to_track(&[], TrackTarget::New)).expect_err("empty");
    assert!(matches!(error, ApplyError::Validation(_)));
    assert_eq!(label(&state, 1).track, TrackId::NONE);
}

#[test]
fn add_track_creates_linked_labels_atomically() {
    let state = state_with_items(2);
    let member = |item_index| TrackLabel {
        item_index,
        label: make_label(LabelParams {
            label_type: Some(LabelTypeName::Box2d),
            ..LabelParams::default()
        }),
        shapes: vec![make_rect(0.0, 0.0, 4.0, 4.0).into()],
    };

    let next = step(&state, add_track(vec![member(0), member(1)]));
    assert_eq!(next.task.tracks[&TrackId(0)].labels.len(), 2);
    assert_eq!(label(&next, 0).track, TrackId(0));
    assert_eq!(label(&next, 1).track, TrackId(0));
    assert_eq!(next.task.status.max_track_id, TrackId(0));
    assert_eq!(check_integrity(&next), Vec::new());

    let error = apply(&state, &add_track(vec![member(0), member(5)])).expect_err("range");
    assert!(matches!(error, ApplyError::Consistency(_)));
    assert_eq!(state.task.label_count(), 0);

    let error = apply(&state, &add_track(vec![member(1), member(1)])).expect_err("repeat");
    assert!(matches!(error, ApplyError::Consistency(_)));
}

#[test]
fn delete_track_detaches_but_keeps_labels() {
    let mut state = state_with_items(2);
    state = step(&state, add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0));
    state = step(&state, add_box2d_label(1, &[], 0.0, 0.0, 1.0, 1.0));
    state = step(
        &state,
        link_labels_to_track(&[LabelId(0), LabelId(1)], TrackTarget::New),
    );

    let next = step(&state, delete_track(TrackId(0)));
    assert!(next.task.tracks.is_empty());
    assert_eq!(label(&next, 0).track, TrackId::NONE);
    assert_eq!(label(&next, 1).track, TrackId::NONE);
    assert_eq!(next.task.label_count(), 2);

    let error = apply(&next, &delete_track(TrackId(0))).expect_err("gone");
    assert_eq!(error, ApplyError::not_found(EntityKind::Track, TrackId(0)));
}

#[test]
fn submit_marks_the_task_config() {
    let state = state_with_items(1);
    let next = step(&state, submit(1_700_000_000));
    assert!(next.task.config.submitted);
    assert_eq!(next.task.config.submit_time, 1_700_000_000);
    assert!(!state.task.config.submitted);
}

#[test]
fn unknown_wire_actions_leave_the_state_untouched() {
    let state = state_with_items(1);
    let error = apply_json(&state, &json!({ "type": "teleport", "payload": {} })).expect_err("tag");
    assert_eq!(error, ApplyError::UnsupportedAction("teleport".into()));

    let next = apply_json(
        &state,
        &serde_json::to_value(add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0)).expect("encode"),
    )
    .expect("known tag");
    assert_eq!(next.task.label_count(), 1);
}

fn with_status(state: &State, status: TaskStatus) -> State {
    let mut task = Task::clone(&state.task);
    task.status = status;
    State::from_task(task)
}

#[test]
fn exhausted_counters_are_rejected_without_panicking() {
    let base = state_with_items(2);
    for status in [
        TaskStatus {
            max_order: i64::MAX,
            ..TaskStatus::default()
        },
        TaskStatus {
            max_label_id: LabelId(i64::MAX),
            ..TaskStatus::default()
        },
        TaskStatus {
            max_shape_id: ShapeId(i64::MAX),
            ..TaskStatus::default()
        },
    ] {
        let state = with_status(&base, status);
        let error = apply(&state, &add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0))
            .expect_err("counter exhausted");
        assert_eq!(error.code(), crate::error::ErrorCode::Consistency);
        assert!(error.to_string().contains("counter exhausted"));
        assert!(state.task.items[0].labels.is_empty());
        assert_eq!(state.task.status, status);
    }

    let state = step(&base, add_box2d_label(0, &[], 0.0, 0.0, 1.0, 1.0));
    let state = step(&state, add_box2d_label(1, &[], 0.0, 0.0, 1.0, 1.0));
    let exhausted = with_status(
        &state,
        TaskStatus {
            max_track_id: TrackId(i64::MAX),
            ..state.task.status
        },
    );
    let error = apply(
        &exhausted,
        &link_labels_to_track(&[LabelId(0), LabelId(1)], TrackTarget::New),
    )
    .expect_err("track counter");
    assert_eq!(error.code(), crate::error::ErrorCode::Consistency);
    let (_, first) = exhausted.task.find_label(LabelId(0)).expect("label");
    assert_eq!(first.track, TrackId::NONE);
}
