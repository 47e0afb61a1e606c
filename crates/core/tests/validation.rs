use gate_core::error::WorkflowInputError;
use gate_core::model::CodeBuildInput;
use gate_core::validation::{parse_workflow_input, validate_workflow_input, Decision};

const SCENARIO: &str = r#"{
    "CodeBuildInputs": [
        {"Bucket": "b", "Key": "k1"},
        {"Bucket": "b", "Key": "k2"}
    ],
    "Context": {
        "EnvironmentEvaluation": "Prod",
        "PipelineOwnershipMetadata": {"PipelineId": "App1"}
    }
}"#;

#[test]
fn parses_bare_input() {
    let input = parse_workflow_input(SCENARIO.as_bytes()).unwrap();
    assert_eq!(
        input.code_build_inputs,
        vec![CodeBuildInput::new("b", "k1"), CodeBuildInput::new("b", "k2")]
    );
    assert_eq!(input.context.environment_evaluation, "Prod");
    assert!(input.code_pipeline_execution_id.is_none());
}

#[test]
fn envelope_and_bare_input_agree() {
    let envelope = r#"{
        "CodeBuildToSfnArtifact": {
            "CodePipelineExecutionId": "exec-123",
            "CodeBuildInputs": [
                {"Bucket": "b", "Key": "k1"},
                {"Bucket": "b", "Key": "k2"}
            ],
            "Context": {
                "EnvironmentEvaluation": "Prod",
                "PipelineOwnershipMetadata": {"PipelineId": "App1"}
            }
        }
    }"#;
    let wrapped = parse_workflow_input(envelope.as_bytes()).unwrap();
    let bare = parse_workflow_input(SCENARIO.as_bytes()).unwrap();
    assert_eq!(wrapped.code_build_inputs, bare.code_build_inputs);
    assert_eq!(wrapped.context, bare.context);
    assert_eq!(wrapped.code_pipeline_execution_id.as_deref(), Some("exec-123"));
}

#[test]
fn rejects_unparseable_input() {
    let err = parse_workflow_input(b"{not json").unwrap_err();
    assert!(matches!(err, WorkflowInputError::Parse(_)));

    let missing_context = r#"{"CodeBuildInputs": []}"#;
    let err = parse_workflow_input(missing_context.as_bytes()).unwrap_err();
    assert!(matches!(err, WorkflowInputError::Parse(_)));
}

#[test]
fn blocks_empty_bucket_or_key() {
    let raw = r#"{
        "CodeBuildInputs": [{"Bucket": "", "Key": "k"}, {"Bucket": "b", "Key": " "}],
        "Context": {"EnvironmentEvaluation": "Prod"}
    }"#;
    match parse_workflow_input(raw.as_bytes()) {
        Err(WorkflowInputError::Invalid(violations)) => assert_eq!(violations.len(), 2),
        other => panic!("expected Invalid, got {other:?}"),
    }
}

#[test]
fn odd_keys_are_reported_not_rejected() {
    let raw = r#"{
        "CodeBuildInputs": [
            {"Bucket": "b", "Key": "exec-1/template.json"},
            {"Bucket": "b", "Key": "exec-1/../other.json"},
            {"Bucket": "b", "Key": "/abs.json"}
        ],
        "Context": {"EnvironmentEvaluation": "Prod"}
    }"#;
    let input = parse_workflow_input(raw.as_bytes()).unwrap();
    assert_eq!(input.code_build_inputs.len(), 3);

    let outcome = validate_workflow_input(&input);
    assert_eq!(outcome.decision, Decision::Warn);
    assert!(outcome.violations.is_empty());
    assert_eq!(outcome.warnings.len(), 2);
    assert!(outcome.warnings[0].contains("exec-1/../other.json"));
}

#[test]
fn warns_on_empty_list_and_duplicates() {
    let empty = parse_workflow_input(
        br#"{"CodeBuildInputs": [], "Context": {"EnvironmentEvaluation": "Prod"}}"#,
    )
    .unwrap();
    assert_eq!(validate_workflow_input(&empty).decision, Decision::Warn);

    let dup = parse_workflow_input(
        br#"{
            "CodeBuildInputs": [{"Bucket": "b", "Key": "k"}, {"Bucket": "b", "Key": "k"}],
            "Context": {"EnvironmentEvaluation": "Prod"}
        }"#,
    )
    .unwrap();
    let out = validate_workflow_input(&dup);
    assert_eq!(out.decision, Decision::Warn);
    assert_eq!(dup.code_build_inputs.len(), 2, "duplicates are kept");
    assert!(out.warnings[0].contains("duplicate"));
}

#[test]
fn allows_well_formed_input() {
    let input = parse_workflow_input(SCENARIO.as_bytes()).unwrap();
    let out = validate_workflow_input(&input);
    assert_eq!(out.decision, Decision::Allow);
    assert!(out.warnings.is_empty());
}
