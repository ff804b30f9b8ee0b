use anyhow::Result;
use log::info;
use promptfit::adapter::{Adapter, AdapterSpec};
use promptfit::scenario::Instance;
use promptfit::utils::token::tiktoken::Tiktoken;
use promptfit_demos::render_requests;

const SPEC: &str = r#"{
    "method": "multiple_choice_joint",
    "model": "openai/davinci",
    "instructions": "Answer with the letter of the correct choice.",
    "input_prefix": "Question: ",
    "output_prefix": "\nAnswer: ",
    "max_train_instances": 2,
    "num_train_trials": 2,
    "max_tokens": 1,
    "temperature": 0.0
}"#;

const INSTANCES: &str = r#"[
    {"input": "Is the sky blue?", "split": "train",
     "references": [{"output": "yes", "tags": ["correct"]}, {"output": "no"}]},
    {"input": "Is fire cold?", "split": "train",
     "references": [{"output": "yes"}, {"output": "no", "tags": ["correct"]}]},
    {"input": "Is grass green?", "split": "train",
     "references": [{"output": "yes", "tags": ["correct"]}, {"output": "no"}]},
    {"input": "Is ice hot?",
     "references": [{"output": "yes"}, {"output": "no", "tags": ["correct"]}]}
]"#;

fn main() -> Result<()> {
    env_logger::init();
    let spec = AdapterSpec::from_json(SPEC)?;
    let instances: Vec<Instance> = serde_json::from_str(INSTANCES)?;
    let adapter = Adapter::new(spec, Tiktoken::new("openai/davinci")?)?;
    let scenario_state = adapter.adapt(&instances)?;
    info!("{} requests", scenario_state.request_states.len());
    print!("{}", render_requests(&scenario_state));
    println!("{}", serde_json::to_string_pretty(&scenario_state.request_states[0])?);
    Ok(())
}
