//! The researcher + writer crew behind `/kickoff`.

use std::path::Path;
use std::sync::Arc;

use crewline_common::Result;
use crewline_crew::{Agent, Crew, CrewConfig, Process, Task, Tool};
use crewline_llm::LlmClient;

/// Build a fresh two-agent crew. Text carries `{topic}` placeholders that
/// [`Crew::run`] fills in.
pub fn blog_crew(
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn Tool>,
    output_file: &Path,
    config: CrewConfig,
) -> Result<Crew> {
    let researcher = Agent::new(
        "Senior Researcher",
        "Uncover groundbreaking technologies in {topic}",
        "Driven by curiosity, you're at the forefront of innovation, eager to \
         explore and share knowledge that could change the world.",
    )?
    .with_tool(Arc::clone(&search))
    .with_delegation(true);

    let writer = Agent::new(
        "Writer",
        "Narrate compelling tech stories about {topic}",
        "With a flair for simplifying complex topics, you craft engaging \
         narratives that captivate and educate, bringing new discoveries to \
         light in an accessible manner.",
    )?
    .with_tool(Arc::clone(&search));

    let research_task = Task::new(
        "Identify the next big trend in {topic}. Focus on identifying pros and \
         cons and the overall narrative. Your final report should clearly \
         articulate the key points, its market opportunities, and potential risks.",
        "A comprehensive 3 paragraphs long report on the latest AI trends.",
        &researcher,
    )
    .with_tools([Arc::clone(&search)]);

    let write_task = Task::new(
        "Compose an insightful article on {topic}. Focus on the latest trends \
         and how it's impacting the industry. This article should be easy to \
         understand, engaging, and positive.",
        "A 4 paragraph article on {topic} advancements formatted as markdown.",
        &writer,
    )
    .with_tools([search])
    .with_output_file(output_file);

    Crew::builder()
        .agents([researcher, writer])
        .tasks([research_task, write_task])
        .process(Process::Sequential)
        .llm(llm)
        .config(config)
        .build()
}
