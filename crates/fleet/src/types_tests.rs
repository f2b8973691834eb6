use chrono::TimeZone;

use super::*;

fn job_event(labels: &[&str]) -> JobEvent {
    JobEvent {
        repository: RepositoryId::parse("brb/cilium").unwrap(),
        action: JobAction::Queued,
        job_id: Some(JobId::new(7)),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        runner_name: None,
    }
}

#[test]
fn job_action_maps_wire_values() {
    assert_eq!(JobAction::from_wire("queued"), JobAction::Queued);
    assert_eq!(JobAction::from_wire("completed"), JobAction::Completed);
    assert_eq!(
        JobAction::from_wire("in_progress"),
        JobAction::Other("in_progress".to_string())
    );
}

#[test]
fn label_match_ignores_case() {
    let label = RunnerLabel::new("self-hosted").unwrap();
    assert!(job_event(&["Self-Hosted", "linux"]).has_label(&label));
    assert!(!job_event(&["ubuntu-latest"]).has_label(&label));
    assert!(!job_event(&[]).has_label(&label));
}

#[test]
fn gce_timestamps_with_offsets_parse() {
    let ts = Timestamp::parse_rfc3339("2022-08-10T01:02:03.456-07:00").unwrap();
    assert_eq!(
        ts.as_datetime(),
        Utc.with_ymd_and_hms(2022, 8, 10, 8, 2, 3).unwrap() + chrono::Duration::milliseconds(456)
    );
    assert!(Timestamp::parse_rfc3339("yesterday").is_none());
    assert!(Timestamp::parse_rfc3339("").is_none());
}

#[test]
fn age_saturates_for_future_timestamps() {
    let now = Timestamp::from_utc(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    let earlier = Timestamp::from_utc(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
    let later = Timestamp::from_utc(Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap());
    assert_eq!(earlier.age_at(now), Duration::from_secs(3 * 3600));
    assert_eq!(later.age_at(now), Duration::ZERO);
}

#[test]
fn instance_spec_debug_hides_startup_script() {
    let spec = InstanceSpec {
        name: InstanceName::new("gh-runner-1").unwrap(),
        zone: ZoneName::new("europe-west1-b").unwrap(),
        description: String::new(),
        machine_type: "n1-standard-4".into(),
        source_image: "img".into(),
        disk_size_gb: 30,
        disk_type: "pd-balanced".into(),
        network: "default".into(),
        startup_script: "--token AAAA-SECRET".into(),
        labels: BTreeMap::new(),
    };
    let rendered = format!("{spec:?}");
    assert!(!rendered.contains("AAAA-SECRET"));
    assert!(rendered.contains("gh-runner-1"));
}

#[test]
fn registration_token_debug_is_redacted() {
    let token = RegistrationToken::new("AAAA-SECRET", None);
    assert!(!format!("{token:?}").contains("AAAA-SECRET"));
    assert_eq!(token.expose(), "AAAA-SECRET");
}

#[test]
fn route_state_transitions() {
    use RouteState::*;
    assert!(Unvalidated.can_transition_to(Rejected));
    assert!(Unvalidated.can_transition_to(Validated));
    assert!(Validated.can_transition_to(Ignored));
    assert!(Routed.can_transition_to(Provisioning));
    assert!(Terminating.can_transition_to(Completed));
    assert!(!Unvalidated.can_transition_to(Routed));
    assert!(!Ignored.can_transition_to(Routed));
    assert!(!Completed.can_transition_to(Failed));

    for terminal in [Rejected, Ignored, Completed, Failed] {
        assert!(terminal.is_terminal());
    }
    for open in [Unvalidated, Validated, Routed, Provisioning, Terminating] {
        assert!(!open.is_terminal());
    }
}

#[test]
fn outcomes_map_to_terminal_states() {
    assert_eq!(
        RouteOutcome::Ignored(IgnoreReason::Ping).state(),
        RouteState::Ignored
    );
    let provisioned = RouteOutcome::Provisioned {
        instance: InstanceName::new("gh-runner-1").unwrap(),
        outcome: ProvisionOutcome::AlreadyExists,
    };
    assert_eq!(provisioned.state(), RouteState::Completed);
}

#[test]
fn delivery_id_is_parsed_from_the_header_value() {
    let mut delivery = RawDelivery {
        delivery_id: Some("72d3162e-cc78-11e3-81ab-4c9367dc0958".to_string()),
        ..RawDelivery::default()
    };
    assert_eq!(
        delivery.parsed_delivery_id().map(|id| id.to_string()),
        Some("72d3162e-cc78-11e3-81ab-4c9367dc0958".to_string())
    );

    delivery.delivery_id = Some("not-a-guid".to_string());
    assert!(delivery.parsed_delivery_id().is_none());

    delivery.delivery_id = None;
    assert!(delivery.parsed_delivery_id().is_none());
}
