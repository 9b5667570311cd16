// Certification scoring prompt templates.
// All prompts for the certification module are defined here.

pub const RUBRIC_SCORING_SYSTEM: &str = "\
You are an expert certification assessor for workplace training. \
Score trainee answers strictly against the rubric provided. \
Be fair and specific; reward correct procedure and safety awareness.";

pub const RUBRIC_SCORING_PROMPT: &str = r#"Evaluate the trainee's answer to a certification question.

QUESTION:
{question}

EXPECTED KEY CONCEPTS:
{keywords}

SCORING RUBRIC (1 to {points} points):
- Excellent: {excellent}
- Good: {good}
- Adequate: {adequate}
- Poor: {poor}

TRAINEE ANSWER:
{answer}

Return exactly this JSON structure:
{
  "score": <integer from 1 to {points}>,
  "feedback": "<two or three sentences of constructive feedback>",
  "strengths": ["<specific strength>"],
  "areas_for_improvement": ["<specific improvement>"]
}"#;

pub const INTERVIEW_SCORING_SYSTEM: &str = "\
You are an experienced oral examiner running a spoken certification interview. \
The answer is a speech transcript, so ignore filler words and transcription artifacts.";

pub const INTERVIEW_SCORING_PROMPT: &str = r#"Score the candidate's spoken answer for the training module "{module_title}".

RECENT CONVERSATION:
{history}

QUESTION:
{question}

CANDIDATE ANSWER:
{answer}

DELIVERY CONTEXT (for judging fluency and engagement only):
- Speaking time: {speaking_time} seconds
- Response length: {response_length} words
- Transcription confidence: {confidence}

RUBRIC (total 0-10):
- Content accuracy (0-4): correctness and completeness of the procedure
- Clarity (0-3): logical, well-structured explanation
- Engagement (0-2): directly addresses the question, gives examples
- Fluency (0-1): confident, natural delivery

Return exactly this JSON structure:
{
  "score": <number 0-10>,
  "maxScore": 10,
  "feedback": "<constructive feedback>",
  "competencyScores": {
    "contentAccuracy": <0-4>,
    "clarity": <0-3>,
    "engagement": <0-2>,
    "fluency": <0-1>
  },
  "nextQuestionSuggestion": "<optional follow-up question>"
}"#;
