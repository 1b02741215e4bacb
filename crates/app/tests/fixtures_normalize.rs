use capacious_e2e::{
    FIXED_ID, IdFields, ValidationError, clean_seating_request_ids,
    fixtures::Fixture,
    normalize_json,
    records::{SeatingRequest, from_body},
};
use serde_json::json;

#[test]
fn invitee_response_normalizes_to_fixture() {
    let raw = Fixture::load_json("inputs/invitee_response.json").expect("load input");
    let expected = Fixture::load_json("expected/invitee_normalized.json").expect("load expected");

    let normalized = normalize_json(&raw).expect("normalize");
    assert_eq!(normalized, expected);
}

#[test]
fn malformed_nested_id_is_reported_with_its_path() {
    let mut raw = Fixture::load_json("inputs/invitee_response.json").expect("load input");
    raw["friends"][0]["self"]["guest_id"] = json!("7D20CD6A-7917-11E5-8B8E-A37BEB0FDAE8");

    let err = normalize_json(&raw).unwrap_err();
    assert!(matches!(err, ValidationError::InvalidUuid { .. }));
    assert_eq!(err.field(), "$.friends[0].self.guest_id");
}

#[test]
fn seating_request_choices_clean_without_seating_ids() {
    let raw = Fixture::load_json("inputs/seating_request_choices.json").expect("load input");
    let choices: Vec<SeatingRequest> = from_body("seating_requests", raw).expect("shape");

    let cleaned = clean_seating_request_ids(&choices, IdFields::Optional).expect("clean");
    assert_eq!(cleaned.len(), 2);
    for (before, after) in choices.iter().zip(&cleaned) {
        assert_eq!(after.invitee_request_id.as_deref(), Some(FIXED_ID));
        assert_eq!(after.invitee_seating_request_id, None);
        assert_eq!(after.first_name, before.first_name);
    }
}

#[test]
fn seating_request_choices_fail_when_ids_are_guaranteed() {
    let raw = Fixture::load_json("inputs/seating_request_choices.json").expect("load input");
    let choices: Vec<SeatingRequest> = from_body("seating_requests", raw).expect("shape");

    let err = clean_seating_request_ids(&choices, true).unwrap_err();
    assert_eq!(
        err,
        ValidationError::MissingField {
            field: "seating_requests[0].invitee_seating_request_id".into()
        }
    );
}
