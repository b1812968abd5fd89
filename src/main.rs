use std::io::{self, BufRead, Write};
use std::sync::Arc;

use env_logger::Env;

use starprep::analysis::AnalyzeError;
use starprep::config::AppConfig;
use starprep::history::{best_score, score_color, FileHistoryRepository};
use starprep::openai::OpenAiClient;
use starprep::questions::Topic;
use starprep::recorder::{format_time, CpalMicrophone, RecorderState};
use starprep::session::PracticeSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    let api = Arc::new(OpenAiClient::new(config));
    let repo = Box::new(FileHistoryRepository::new(FileHistoryRepository::default_path()));
    let mic = Box::new(CpalMicrophone::new());
    let mut session = PracticeSession::new(api, repo, mic);

    println!("=== StarPrep - STAR interview practice ===");
    println!("Type 'help' for commands.\n");

    session.start().await;
    print_question(&session);

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "help" => print_help(),
            "topics" => {
                for topic in Topic::ALL {
                    println!("  {topic}");
                }
            }
            "topic" => match Topic::parse(rest) {
                Some(topic) => {
                    session.change_topic(topic).await;
                    print_question(&session);
                }
                None => println!("Unknown topic: {rest:?} (see 'topics')"),
            },
            "next" => {
                session.next_question().await;
                print_question(&session);
            }
            "answer" => {
                if rest.is_empty() {
                    println!("Usage: answer <your answer text>");
                } else {
                    session.submit_typed_answer(rest);
                    println!("Answer recorded ({} chars).", rest.len());
                }
            }
            "record" => match session.start_recording() {
                Ok(()) => println!("Recording... type 'stop' to finish."),
                Err(e) => println!("Could not start recording: {e}"),
            },
            "stop" => match session.stop_recording() {
                Ok(()) => {
                    println!("Transcribing your answer...");
                    session.recorder.wait_for_transcription().await;
                    println!(
                        "[{}] {}",
                        format_time(session.recorder.recording_seconds()),
                        session.recorder.answer_text()
                    );
                }
                Err(e) => println!("Could not stop recording: {e}"),
            },
            "play" => {
                if session.recorder.state() == RecorderState::Ready {
                    session.recorder.toggle_playback();
                    println!(
                        "Playback {}",
                        if session.recorder.is_playing() { "started" } else { "stopped" }
                    );
                } else {
                    println!("Nothing to play back yet.");
                }
            }
            "analyze" => match session.analyze_answer().await {
                Ok(()) => print_feedback(&session),
                Err(AnalyzeError::EmptyAnswer) => {
                    println!("Cannot analyze: no valid answer to analyze.");
                }
            },
            "save" => match session.save_result() {
                Ok(()) => println!("Result saved to history."),
                Err(e) => println!("Cannot save result: {e}"),
            },
            "history" => print_history(&session),
            "delete" => {
                let mut parts = rest.splitn(3, '|').map(str::trim);
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(topic), Some(question), Some(id))
                        if !topic.is_empty() && !question.is_empty() && !id.is_empty() =>
                    {
                        match session.history.delete_entry(topic, question, id) {
                            Ok(true) => println!("Entry deleted."),
                            Ok(false) => println!("No matching entry."),
                            Err(e) => println!("Could not delete entry: {e}"),
                        }
                    }
                    _ => println!("Usage: delete <topic> | <question> | <entry id>"),
                }
            }
            "clear" => match session.history.clear_all() {
                Ok(()) => println!("History cleared."),
                Err(e) => println!("Could not clear history: {e}"),
            },
            "reset" => {
                session.discard_answer();
                println!("Answer and feedback cleared.");
            }
            "avatar" => {
                let url = session.refresh_avatar().await;
                println!("Interviewer portrait: {url}");
            }
            "quit" | "exit" => break,
            other => println!("Unknown command: {other:?} (try 'help')"),
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        "Commands:\n\
         \x20 topics                       list available topics\n\
         \x20 topic <name>                 switch topic\n\
         \x20 next                         pick the next question\n\
         \x20 answer <text>                submit a typed answer\n\
         \x20 record / stop                record a spoken answer\n\
         \x20 play                         toggle playback of the recording\n\
         \x20 analyze                      score the current answer\n\
         \x20 save                         save the evaluated attempt\n\
         \x20 history                      show saved attempts\n\
         \x20 delete <topic>|<q>|<id>      delete one attempt\n\
         \x20 clear                        clear all history\n\
         \x20 reset                        discard the current answer\n\
         \x20 avatar                       refresh the interviewer portrait\n\
         \x20 quit                         leave"
    );
}

fn print_question(session: &PracticeSession<OpenAiClient>) {
    match session.questions.current_question() {
        Some(question) => println!("[{}] {question}", session.questions.topic()),
        None => println!("[{}] (no question selected)", session.questions.topic()),
    }
}

fn print_feedback(session: &PracticeSession<OpenAiClient>) {
    let Some(feedback) = session.feedback() else {
        println!("No feedback yet.");
        return;
    };

    println!(
        "Overall: {}/100 ({:?})",
        feedback.overall_score,
        score_color(feedback.overall_score)
    );
    for (category, metric) in &feedback.categories {
        println!("  {category}: {}/100 - {}", metric.score, metric.feedback);
    }
    for (metric_name, metric) in &feedback.additional_metrics {
        println!("  {metric_name}: {}/100 - {}", metric.score, metric.feedback);
    }
    if !feedback.general_feedback.is_empty() {
        println!("Feedback: {}", feedback.general_feedback);
    }
    if !feedback.improvement_suggestions.is_empty() {
        println!("Suggestions:");
        for suggestion in &feedback.improvement_suggestions {
            println!("  - {suggestion}");
        }
    }
    if let Some(example) = &feedback.example_answer {
        println!("\nExample answer:\n{example}");
    }
}

fn print_history(session: &PracticeSession<OpenAiClient>) {
    let history = session.history.history();
    if history.is_empty() {
        println!("No saved attempts yet.");
        return;
    }

    for (topic, questions) in history {
        println!("{topic}:");
        for (question, entries) in questions {
            println!("  {question} (best {}/100)", best_score(entries));
            for entry in entries {
                println!(
                    "    [{}] {}/100 ({:?}) id={}",
                    entry.date,
                    entry.score,
                    score_color(entry.score),
                    entry.id
                );
            }
        }
    }
}
