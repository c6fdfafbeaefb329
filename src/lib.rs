/*!
# Student Insights

A small web application for asking natural-language questions about a school's
student records, answered by a chat-completion model.

## Overview

A CSV of student records (name, class, subject marks, attendance) is loaded
once at startup. Every page shows a dashboard of statistics computed from it,
and a form lets the user ask a question. The question is embedded, together
with the whole table, into a prompt that asks the model for a fixed 4-line
answer.

## Architecture

### Web Layer
- **Technologies**: axum, handlebars, tower-http
- **Key Components**:
  - Request Handler - `GET /` renders the page, `POST /` answers a question
  - CSRF Guard - signed-cookie token checked on every form post
  - Templates - one embedded handlebars page plus a static stylesheet

### Core
- **Dataset Loader** - reads the CSV into an immutable table and keeps its CSV text
- **Statistics Summarizer** - counts, means, top performers and per-class means
- **Prompt Builder** - validates the question and formats the prompt
- **Answer Service** - calls the model with bounded, jittered exponential backoff

### External Services
- Any OpenAI-compatible `/v1/chat/completions` endpoint

## Error Handling

- Startup failures (missing dataset, missing API key) stop the process
- Bad questions and missing columns are shown inline on the page
- Transient API failures are retried, then replaced by a fixed message
- Other failures are logged and replaced by a generic message

## Modules

- **dataset**: CSV loading and serialization
- **stats**: dashboard statistics
- **prompt**: question validation and prompt text
- **completion**: chat-completion trait and HTTP client
- **answer**: retrying answer service
- **csrf**: anti-forgery tokens
- **config**: command-line and environment configuration
- **logging**: logger setup and startup logging
- **error**: error types
- **app**: routing and handlers
*/

pub mod answer;
pub mod app;
pub mod completion;
pub mod config;
pub mod csrf;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod prompt;
pub mod stats;

/// Re-export the types most callers need
pub use answer::{Answer, AnswerService, RetryPolicy};
pub use completion::{ChatCompletion, ChatMessage, ChatRequest, OpenAiClient};
pub use dataset::Dataset;
pub use error::{CompletionError, LoadError};
pub use stats::{DashboardStats, StatsError, TopPerformer};
