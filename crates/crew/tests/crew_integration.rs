//! End-to-end crew runs against scripted LLMs and in-memory tools.

use async_trait::async_trait;
use crewline_common::{CrewError, Result};
use crewline_crew::{Agent, Crew, CrewConfig, Task, Tool};
use crewline_llm::{LlmClient, LlmRequest, LlmResponse, TokenUsage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Answers per agent role (read from the system prompt) and records every request.
#[derive(Default)]
struct RoleScriptedLlm {
    scripts: Mutex<HashMap<String, VecDeque<Result<String>>>>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl RoleScriptedLlm {
    fn new() -> Self {
        Self::default()
    }

    fn script(self, role: &str, replies: Vec<Result<String>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(role.to_string(), replies.into());
        self
    }

    fn delay(mut self, role: &str, delay: Duration) -> Self {
        self.delays.insert(role.to_string(), delay);
        self
    }

    fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn requests_for(&self, role: &str) -> Vec<LlmRequest> {
        self.requests()
            .into_iter()
            .filter(|r| role_of(r) == role)
            .collect()
    }
}

fn role_of(request: &LlmRequest) -> String {
    request
        .system_prompt
        .as_deref()
        .and_then(|p| p.strip_prefix("You are "))
        .and_then(|p| p.split('.').next())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl LlmClient for RoleScriptedLlm {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let role = role_of(&request);
        self.requests.lock().unwrap().push(request);

        if let Some(delay) = self.delays.get(&role) {
            tokio::time::sleep(*delay).await;
        }

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&role)
            .and_then(|queue| queue.pop_front());
        let content = match next {
            Some(reply) => reply?,
            None => format!("{role} final answer"),
        };

        Ok(LlmResponse {
            content,
            model: "scripted".into(),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
            finish_reason: Some("stop".into()),
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Returns canned search results and counts its calls.
struct MockSearch {
    calls: AtomicUsize,
    delay: Duration,
}

impl MockSearch {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn hanging() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl Tool for MockSearch {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the internet"
    }

    async fn invoke(&self, query: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(format!("Title: {query} breakthroughs\nSnippet: error rates halved"))
    }
}

fn ok(reply: &str) -> Result<String> {
    Ok(reply.to_string())
}

fn researcher(search: Arc<dyn Tool>) -> Agent {
    Agent::new(
        "Senior Researcher",
        "Uncover groundbreaking technologies in {topic}",
        "Driven by curiosity, you're at the forefront of innovation.",
    )
    .unwrap()
    .with_tool(search)
    .with_delegation(true)
}

fn writer() -> Agent {
    Agent::new(
        "Writer",
        "Narrate compelling tech stories about {topic}",
        "With a flair for simplifying complex topics, you craft engaging narratives.",
    )
    .unwrap()
}

fn blog_crew(llm: Arc<RoleScriptedLlm>, search: Arc<dyn Tool>, output_file: Option<&std::path::Path>) -> Crew {
    let researcher = researcher(search);
    let writer = writer();

    let research = Task::new(
        "Identify the next big trend in {topic}.",
        "A comprehensive 3 paragraphs long report.",
        &researcher,
    );
    let mut write = Task::new(
        "Compose an insightful article on {topic}.",
        "A 4 paragraph article on {topic} advancements formatted as markdown.",
        &writer,
    );
    if let Some(path) = output_file {
        write = write.with_output_file(path);
    }

    Crew::builder()
        .agents([researcher, writer])
        .tasks([research, write])
        .llm(llm)
        .build()
        .unwrap()
}

#[tokio::test]
async fn quantum_computing_run_returns_writer_output() {
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script(
                "Senior Researcher",
                vec![ok(r#"{"action":"final_answer","answer":"Report: qubit counts are doubling."}"#)],
            )
            .script("Writer", vec![ok("# Quantum Leap\n\nQubits are here.")]),
    );
    let crew = blog_crew(llm.clone(), Arc::new(MockSearch::new()), None);

    let output = crew.run("quantum computing").await.unwrap();

    assert_eq!(output.raw, "# Quantum Leap\n\nQubits are here.");
    assert_eq!(output.tasks_output.len(), 2);
    assert_eq!(output.tasks_output[0].agent_role, "Senior Researcher");
    assert_eq!(output.tasks_output[0].raw, "Report: qubit counts are doubling.");
    assert_eq!(output.tasks_output[1].agent_role, "Writer");
    assert_eq!(output.usage.total(), 30);

    let research_request = &llm.requests_for("Senior Researcher")[0];
    assert!(research_request
        .system_prompt
        .as_deref()
        .unwrap()
        .contains("Uncover groundbreaking technologies in quantum computing"));
    assert!(research_request.messages[0]
        .content
        .contains("Identify the next big trend in quantum computing."));
}

#[tokio::test]
async fn context_flows_forward_in_task_order() {
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script("Senior Researcher", vec![ok("RESEARCH-NOTES")])
            .script("Writer", vec![ok("ARTICLE")]),
    );
    let crew = blog_crew(llm.clone(), Arc::new(MockSearch::new()), None);

    crew.run("robotics").await.unwrap();

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(role_of(&requests[0]), "Senior Researcher");
    assert_eq!(role_of(&requests[1]), "Writer");

    // The first task sees no context; the second sees only the first's output.
    assert!(!requests[0].messages[0].content.contains("Context for this task"));
    let writer_prompt = &requests[1].messages[0].content;
    assert!(writer_prompt.contains("Context for this task:\nRESEARCH-NOTES"));
    assert!(!writer_prompt.contains("ARTICLE"));
}

#[tokio::test]
async fn researcher_uses_search_before_answering() {
    let search = Arc::new(MockSearch::new());
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script(
                "Senior Researcher",
                vec![
                    ok(r#"{"action":"use_tool","tool":"search","input":"quantum computing 2026"}"#),
                    ok(r#"{"action":"final_answer","answer":"Error rates halved."}"#),
                ],
            )
            .script("Writer", vec![ok("Article")]),
    );
    let crew = blog_crew(llm.clone(), search.clone(), None);

    let output = crew.run("quantum computing").await.unwrap();

    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    assert_eq!(output.tasks_output[0].raw, "Error rates halved.");
    let second_turn = &llm.requests_for("Senior Researcher")[1];
    let observation = &second_turn.messages.last().unwrap().content;
    assert!(observation.contains("Observation from search"));
    assert!(observation.contains("quantum computing 2026 breakthroughs"));
}

#[tokio::test]
async fn hanging_tool_is_bounded_and_run_still_completes() {
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script(
                "Senior Researcher",
                vec![
                    ok(r#"{"action":"use_tool","tool":"search","input":"anything"}"#),
                    ok("Answer without search."),
                ],
            )
            .script("Writer", vec![ok("Article")]),
    );
    let researcher = researcher(Arc::new(MockSearch::hanging()));
    let writer = writer();
    let crew = Crew::builder()
        .agents([researcher.clone(), writer.clone()])
        .task(Task::new("Research {topic}", "Notes", &researcher))
        .task(Task::new("Write about {topic}", "Article", &writer))
        .llm(llm.clone())
        .config(CrewConfig {
            tool_timeout_ms: 50,
            ..Default::default()
        })
        .build()
        .unwrap();

    let started = Instant::now();
    let output = crew.run("AI").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(output.tasks_output[0].raw, "Answer without search.");
    let observation = llm.requests_for("Senior Researcher")[1]
        .messages
        .last()
        .unwrap()
        .content
        .clone();
    assert!(observation.contains("timed out after 50ms"));
}

#[tokio::test]
async fn delegation_reroutes_without_reordering_tasks() {
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script(
                "Senior Researcher",
                vec![
                    ok(r#"{"action":"delegate","coworker":"Writer","task":"Summarize qubit news","context":"Audience: executives"}"#),
                    ok(r#"{"action":"final_answer","answer":"Report built on the writer's summary."}"#),
                ],
            )
            .script("Writer", vec![ok("SUMMARY-FROM-WRITER"), ok("Final article")]),
    );
    let crew = blog_crew(llm.clone(), Arc::new(MockSearch::new()), None);

    let output = crew.run("quantum computing").await.unwrap();

    let roles: Vec<&str> = output
        .tasks_output
        .iter()
        .map(|o| o.agent_role.as_str())
        .collect();
    assert_eq!(roles, ["Senior Researcher", "Writer"]);
    assert_eq!(output.raw, "Final article");

    let requests = llm.requests();
    assert_eq!(requests.len(), 4);

    // The delegated run sees only what was sent, and cannot delegate further.
    let delegated = &requests[1];
    assert_eq!(role_of(delegated), "Writer");
    let delegated_prompt = &delegated.messages[0].content;
    assert!(delegated_prompt.contains("Current task: Summarize qubit news"));
    assert!(delegated_prompt.contains("Audience: executives"));
    assert!(!delegated.system_prompt.as_deref().unwrap().contains("delegate"));

    // Only the delegate's final text is folded back into the delegator's conversation.
    let folded = requests[2].messages.last().unwrap();
    assert_eq!(folded.content, "Writer replied:\nSUMMARY-FROM-WRITER");

    // Usage of the delegated run is charged to the delegating task.
    assert_eq!(output.tasks_output[0].usage.total(), 45);
}

#[tokio::test]
async fn output_file_is_overwritten_on_each_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new-blog-post.md");

    let first = Arc::new(RoleScriptedLlm::new().script("Writer", vec![ok("A much longer first article body")]));
    blog_crew(first, Arc::new(MockSearch::new()), Some(&path))
        .run("AI")
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "A much longer first article body"
    );

    let second = Arc::new(RoleScriptedLlm::new().script("Writer", vec![ok("Second")]));
    blog_crew(second, Arc::new(MockSearch::new()), Some(&path))
        .run("AI")
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "Second");
}

#[tokio::test]
async fn llm_failure_reports_failing_task_index() {
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script("Senior Researcher", vec![ok("Notes")])
            .script("Writer", vec![Err(CrewError::LlmAuth("401 invalid api key".into()))]),
    );
    let crew = blog_crew(llm, Arc::new(MockSearch::new()), None);

    let err = crew.run("AI").await.unwrap_err();

    match &err {
        CrewError::TaskExecutionFailed { index, source } => {
            assert_eq!(*index, 1);
            assert!(matches!(**source, CrewError::LlmAuth(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(err.root_cause(), CrewError::LlmAuth(_)));
}

#[tokio::test]
async fn unavailable_llm_fails_first_task_without_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("post.md");
    let llm = Arc::new(RoleScriptedLlm::new().script(
        "Senior Researcher",
        vec![Err(CrewError::LlmUnavailable {
            attempts: 4,
            last_error: "503 overloaded".into(),
        })],
    ));
    let crew = blog_crew(llm.clone(), Arc::new(MockSearch::new()), Some(&path));

    let err = crew.run("AI").await.unwrap_err();

    assert!(matches!(err, CrewError::TaskExecutionFailed { index: 0, .. }));
    assert!(matches!(err.root_cause(), CrewError::LlmUnavailable { attempts: 4, .. }));
    assert!(llm.requests_for("Writer").is_empty());
    assert!(!path.exists());
}

#[tokio::test]
async fn blank_writer_output_fails_instead_of_saving_an_empty_post() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("new-blog-post.md");
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script("Senior Researcher", vec![ok("Notes")])
            .script("Writer", vec![ok("   "), ok(""), ok(" \n ")]),
    );
    let researcher = researcher(Arc::new(MockSearch::new()));
    let writer = writer();
    let research = Task::new("Research {topic}.", "Notes.", &researcher);
    let write = Task::new("Write about {topic}.", "An article.", &writer).with_output_file(&path);
    let crew = Crew::builder()
        .agents([researcher, writer])
        .tasks([research, write])
        .llm(llm.clone())
        .config(CrewConfig {
            max_iterations: 2,
            ..Default::default()
        })
        .build()
        .unwrap();

    let err = crew.run("quantum computing").await.unwrap_err();

    assert!(matches!(err, CrewError::TaskExecutionFailed { index: 1, .. }));
    assert!(matches!(err.root_cause(), CrewError::LlmRequest(_)));
    assert_eq!(llm.requests_for("Writer").len(), 3);
    assert!(!path.exists());
}

#[tokio::test]
async fn repeated_runs_are_independent() {
    let llm = Arc::new(RoleScriptedLlm::new());
    let crew = blog_crew(llm.clone(), Arc::new(MockSearch::new()), None);

    let first = crew.run("AI").await.unwrap();
    let second = crew.run("AI").await.unwrap();

    assert_eq!(first.raw, second.raw);
    let requests = llm.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0].system_prompt, requests[2].system_prompt);
    assert_eq!(requests[1].messages[0].content, requests[3].messages[0].content);
}

#[tokio::test]
async fn async_tasks_feed_the_next_sync_task_in_list_order() {
    // The first async task is slower, so it finishes last.
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script("Market Analyst", vec![ok("MARKET")])
            .script("Risk Analyst", vec![ok("RISKS")])
            .script("Writer", vec![ok("Combined article")])
            .delay("Market Analyst", Duration::from_millis(100)),
    );
    let market = Agent::new("Market Analyst", "Size the market", "").unwrap();
    let risk = Agent::new("Risk Analyst", "Find the risks", "").unwrap();
    let writer = writer();

    let crew = Crew::builder()
        .agents([market.clone(), risk.clone(), writer.clone()])
        .task(Task::new("Market for {topic}", "Numbers", &market).with_async_execution(true))
        .task(Task::new("Risks of {topic}", "List", &risk).with_async_execution(true))
        .task(Task::new("Article on {topic}", "Article", &writer))
        .llm(llm.clone())
        .build()
        .unwrap();

    let output = crew.run("fusion").await.unwrap();

    assert_eq!(output.raw, "Combined article");
    let indices: Vec<usize> = output.tasks_output.iter().map(|o| o.index).collect();
    assert_eq!(indices, [0, 1, 2]);

    let writer_prompt = &llm.requests_for("Writer")[0].messages[0].content;
    assert!(writer_prompt.contains("Context for this task:\nMARKET\n\n---\n\nRISKS"));
}

#[tokio::test]
async fn failing_async_task_aborts_the_run() {
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script("Market Analyst", vec![Err(CrewError::LlmAuth("denied".into()))]),
    );
    let market = Agent::new("Market Analyst", "Size the market", "").unwrap();
    let writer = writer();

    let crew = Crew::builder()
        .agents([market.clone(), writer.clone()])
        .task(Task::new("Market", "Numbers", &market).with_async_execution(true))
        .task(Task::new("Article", "Article", &writer))
        .llm(llm.clone())
        .build()
        .unwrap();

    let err = crew.run("fusion").await.unwrap_err();
    assert!(matches!(err, CrewError::TaskExecutionFailed { index: 0, .. }));
    assert!(llm.requests_for("Writer").is_empty());
}

#[tokio::test]
async fn explicit_context_selects_earlier_outputs() {
    let llm = Arc::new(
        RoleScriptedLlm::new()
            .script("Senior Researcher", vec![ok("FIRST"), ok("SECOND")])
            .script("Writer", vec![ok("done")]),
    );
    let researcher = researcher(Arc::new(MockSearch::new()));
    let writer = writer();

    let crew = Crew::builder()
        .agents([researcher.clone(), writer.clone()])
        .task(Task::new("Outline", "Outline", &researcher))
        .task(Task::new("Sources", "Sources", &researcher))
        .task(Task::new("Write", "Article", &writer).with_context([0]))
        .llm(llm.clone())
        .build()
        .unwrap();

    crew.run("AI").await.unwrap();

    let writer_prompt = &llm.requests_for("Writer")[0].messages[0].content;
    assert!(writer_prompt.contains("Context for this task:\nFIRST"));
    assert!(!writer_prompt.contains("SECOND"));
}
