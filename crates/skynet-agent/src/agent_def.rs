use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::tools::Tool;

/// An immutable agent definition: `(name, model_handle, description,
/// instruction, tools, sub_agents)`. Constructed once at process start;
/// composition forms a rooted DAG with no cycles.
pub struct Agent {
    pub name: String,
    pub model_handle: String,
    pub description: String,
    pub instruction: String,
    pub tools: Vec<Arc<dyn Tool>>,
    /// Sub-agents invoked as delegated sub-turns (not tool-shaped).
    pub sub_agents: Vec<Arc<Agent>>,
    /// Sub-agents wrapped so they appear to this agent's LLM as a single
    /// callable tool named after them — see spec §4.2's "Async bridging"
    /// note: wrapping adds no new edge-walking semantics beyond the ones
    /// `validate_acyclic` already follows.
    pub tool_shaped_sub_agents: Vec<Arc<Agent>>,
}

impl Agent {
    /// All outgoing edges — both delegated sub-turns and tool-shaped
    /// wrappings count as reachability for cycle detection.
    fn children(&self) -> impl Iterator<Item = &Arc<Agent>> {
        self.sub_agents.iter().chain(self.tool_shaped_sub_agents.iter())
    }
}

/// Verify no agent in the tree rooted at `root` is reachable from itself.
/// Run once at construction; a cyclic tree is a configuration error, not a
/// runtime condition, so this fails loudly rather than being checked lazily.
pub fn validate_acyclic(root: &Arc<Agent>) -> Result<()> {
    fn visit(node: &Arc<Agent>, stack: &mut Vec<String>, seen: &mut HashSet<String>) -> Result<()> {
        if stack.contains(&node.name) {
            return Err(AgentError::Validation(format!(
                "cycle detected in agent tree: {} -> {}",
                stack.join(" -> "),
                node.name
            )));
        }
        if seen.contains(&node.name) {
            return Ok(());
        }
        seen.insert(node.name.clone());
        stack.push(node.name.clone());
        for child in node.children() {
            visit(child, stack, seen)?;
        }
        stack.pop();
        Ok(())
    }

    let mut stack = Vec::new();
    let mut seen = HashSet::new();
    visit(root, &mut stack, &mut seen)
}

/// Build the canonical agent tree:
///
/// ```text
/// orchestrator
///   ├─ chat_summarizer        (tools: fetch_elements)
///   ├─ canvas_manager         (tools: canvas ops + fetch_elements)
///   ├─ maintenance_agent      (tools: admin ops)
///   └─ disney_facilitator     (sub: dreamer, realist, critic; tool: canvas_manager)
///         ├─ dreamer
///         ├─ realist
///         └─ critic
/// ```
pub fn build_canonical_tree(
    default_model: &str,
    history_tools: Vec<Arc<dyn Tool>>,
    canvas_tools: Vec<Arc<dyn Tool>>,
    admin_tools: Vec<Arc<dyn Tool>>,
) -> Result<Arc<Agent>> {
    let chat_summarizer = Arc::new(Agent {
        name: "chat_summarizer".to_string(),
        model_handle: default_model.to_string(),
        description: "Summarizes recent chat activity from the canvas".to_string(),
        instruction: "Summarize the conversation using fetch_elements. Be concise.".to_string(),
        tools: history_tools.clone(),
        sub_agents: Vec::new(),
        tool_shaped_sub_agents: Vec::new(),
    });

    let mut canvas_manager_tools = canvas_tools.clone();
    canvas_manager_tools.extend(history_tools.clone());
    let canvas_manager = Arc::new(Agent {
        name: "canvas_manager".to_string(),
        model_handle: default_model.to_string(),
        description: "Manages canvas frames and elements for this chat".to_string(),
        instruction: "Use the canvas tools to organize notes, frames, and elements.".to_string(),
        tools: canvas_manager_tools,
        sub_agents: Vec::new(),
        tool_shaped_sub_agents: Vec::new(),
    });

    let maintenance_agent = Arc::new(Agent {
        name: "maintenance_agent".to_string(),
        model_handle: default_model.to_string(),
        description: "Runs administrative operations (version, restart, logs)".to_string(),
        instruction: "Use the admin tools only when explicitly asked by an operator.".to_string(),
        tools: admin_tools,
        sub_agents: Vec::new(),
        tool_shaped_sub_agents: Vec::new(),
    });

    let dreamer = Arc::new(Agent {
        name: "dreamer".to_string(),
        model_handle: default_model.to_string(),
        description: "Generates expansive, unconstrained ideas".to_string(),
        instruction: "Propose bold ideas without judging feasibility.".to_string(),
        tools: Vec::new(),
        sub_agents: Vec::new(),
        tool_shaped_sub_agents: Vec::new(),
    });

    let realist = Arc::new(Agent {
        name: "realist".to_string(),
        model_handle: default_model.to_string(),
        description: "Turns ideas into a concrete, actionable plan".to_string(),
        instruction: "Take the dreamer's ideas and describe how to execute them.".to_string(),
        tools: Vec::new(),
        sub_agents: Vec::new(),
        tool_shaped_sub_agents: Vec::new(),
    });

    let critic = Arc::new(Agent {
        name: "critic".to_string(),
        model_handle: default_model.to_string(),
        description: "Finds flaws and risks in the realist's plan".to_string(),
        instruction: "Identify weaknesses, risks, and open questions in the plan.".to_string(),
        tools: Vec::new(),
        sub_agents: Vec::new(),
        tool_shaped_sub_agents: Vec::new(),
    });

    let disney_facilitator = Arc::new(Agent {
        name: "disney_facilitator".to_string(),
        model_handle: default_model.to_string(),
        description: "Runs a Disney-method brainstorm (dream, realize, critique)".to_string(),
        instruction: "Run dreamer, then realist, then critic in sequence and synthesize.".to_string(),
        tools: Vec::new(),
        sub_agents: vec![dreamer, realist, critic],
        tool_shaped_sub_agents: vec![canvas_manager.clone()],
    });

    let orchestrator = Arc::new(Agent {
        name: "orchestrator".to_string(),
        model_handle: default_model.to_string(),
        description: "Top-level agent that routes each turn to a specialist".to_string(),
        instruction: "Route the user's message to the right specialist sub-agent.\n\n\
            SILENT MODE: the [context] header reports is_forward. If is_forward=1, \
            the message is a forward, not something addressed to you directly — do \
            not delegate to any sub-agent and return an empty response."
            .to_string(),
        tools: Vec::new(),
        sub_agents: vec![chat_summarizer, canvas_manager, maintenance_agent, disney_facilitator],
        tool_shaped_sub_agents: Vec::new(),
    });

    validate_acyclic(&orchestrator)?;
    Ok(orchestrator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_tree_is_acyclic() {
        let tree = build_canonical_tree("gemini-1.5-flash", Vec::new(), Vec::new(), Vec::new()).unwrap();
        assert_eq!(tree.name, "orchestrator");
        assert_eq!(tree.sub_agents.len(), 4);
        let facilitator = &tree.sub_agents[3];
        assert_eq!(facilitator.name, "disney_facilitator");
        assert_eq!(facilitator.sub_agents.len(), 3);
        assert_eq!(facilitator.tool_shaped_sub_agents.len(), 1);
    }

    #[test]
    fn diamond_shaped_reuse_is_not_a_cycle() {
        // `leaf` is reachable from `a` via two different paths (b and the
        // tool-shaped wrapping) — validate_acyclic must not flag that as a
        // cycle, only a node reachable from itself along one path.
        let leaf = Arc::new(Agent {
            name: "leaf".to_string(),
            model_handle: "m".to_string(),
            description: "d".to_string(),
            instruction: "i".to_string(),
            tools: Vec::new(),
            sub_agents: Vec::new(),
            tool_shaped_sub_agents: Vec::new(),
        });
        let b = Arc::new(Agent {
            name: "b".to_string(),
            model_handle: "m".to_string(),
            description: "d".to_string(),
            instruction: "i".to_string(),
            tools: Vec::new(),
            sub_agents: vec![leaf.clone()],
            tool_shaped_sub_agents: Vec::new(),
        });
        let a = Arc::new(Agent {
            name: "a".to_string(),
            model_handle: "m".to_string(),
            description: "d".to_string(),
            instruction: "i".to_string(),
            tools: Vec::new(),
            sub_agents: vec![b],
            tool_shaped_sub_agents: vec![leaf],
        });
        assert!(validate_acyclic(&a).is_ok());
    }
}
