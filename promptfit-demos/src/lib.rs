//! Helpers shared by the `promptfit` demos.

use std::fmt::Write;

use promptfit::adapter::ScenarioState;

/// Render every request of a scenario state for reading in a terminal.
pub fn render_requests(scenario_state: &ScenarioState) -> String {
    let mut out = String::new();
    for state in &scenario_state.request_states {
        let instance = &scenario_state.instances[state.instance_index];
        let _ = writeln!(out, "--- trial {} / instance {} ({}) ---",
                         state.train_trial_index,
                         state.instance_index,
                         instance.id.as_deref().unwrap_or("no id"));
        if let Some(reference_index) = state.reference_index {
            let _ = writeln!(out, "[scoring reference {}]", reference_index);
        }
        let _ = writeln!(out, "{}", state.request.prompt);
        if let Some(mapping) = &state.output_mapping {
            let choices: Vec<String> = mapping.iter().map(|(label, output)| format!("{}={}", label, output)).collect();
            let _ = writeln!(out, "[choices: {}]", choices.join(", "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use promptfit::adapter::{AdaptationMethod, Adapter, AdapterSpec};
    use promptfit::scenario::{Instance, Reference};
    use promptfit::utils::token::tiktoken::Tiktoken;

    use super::render_requests;

    #[test]
    fn test_render_requests() {
        let adapter = Adapter::new(
            AdapterSpec::new(AdaptationMethod::MultipleChoiceSeparate).with_prefixes("Q: ", " A: "),
            Tiktoken::new("openai/davinci").unwrap(),
        ).unwrap();
        let instances = vec![Instance::new("2+2", vec![Reference::correct("4"), Reference::incorrect("5")]).with_id("sum")];
        let rendered = render_requests(&adapter.adapt(&instances).unwrap());
        assert!(rendered.contains("--- trial 0 / instance 0 (sum) ---"));
        assert!(rendered.contains("[scoring reference 1]\nQ: 2+2 A: 5"));
    }
}
