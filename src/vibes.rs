use serde::Serialize;

const VIBE_CHECKS: &[(&str, &str)] = &[
    ("intro", "Please introduce yourself"),
    (
        "explain",
        "Explain the concept of object-oriented programming in simple terms to a complete beginner.",
    ),
    (
        "summarize",
        "Read the following paragraph and provide a concise summary of the key points:\n\n\
Modern large language models (LLMs), such as GPT and PaLM, rely on \
transformer architectures that use self-attention mechanisms to process \
sequences in parallel, enabling scalability and high performance on a \
wide array of natural language tasks. Training these models involves \
massive datasets comprising text from books, websites, code repositories, \
and scientific papers, which provide the statistical foundation for \
learning linguistic patterns and factual associations. Despite their \
impressive capabilities, LLMs exhibit limitations such as hallucination \
(i.e., generating plausible but incorrect information), lack of true \
understanding, and high computational costs during training and inference. \
Ongoing research explores strategies like retrieval-augmented generation \
(RAG), fine-tuning on domain-specific corpora, and integrating symbolic \
reasoning modules to mitigate these weaknesses. Additionally, there is \
increasing emphasis on aligning LLM behavior with human intent using \
reinforcement learning from human feedback (RLHF), as well as efforts \
to reduce environmental impact through model distillation and efficient \
hardware utilization.",
    ),
    (
        "create",
        "Write a short, imaginative story (100–150 words) about a robot finding \
friendship in an unexpected place.",
    ),
    (
        "math",
        "If a store sells apples in packs of 4 and oranges in packs of 3, how many \
packs of each do I need to buy to get exactly 12 apples and 9 oranges?",
    ),
    (
        "formalize",
        "Rewrite the following paragraph in a professional, formal tone:

My Adidas walk through concert doors
And roam all over coliseum floors
I stepped on stage, at Live Aid
All the people gave, and the poor got paid
And out of speakers I did speak
I wore my sneakers but I'm not a sneak
My Adidas touch the sand of a foreign land
With mic in hand, I cold took command
My Adidas and me close as can be
We make a mean team, my Adidas and me
We get around together, we're down forever
And we won't be mad when caught in bad weather",
    ),
    (
        "code_edit",
        "Convert the following recursion written in C into a flat for loop in Python:

#include<stdio.h>
long int multiplyNumbers(int n);
int main() {
    int n;
    printf(\"Enter a positive integer: \");
    scanf(\"%d\",&n);
    printf(\"Factorial of %d = %ld\", n, multiplyNumbers(n));
    return 0;
}
long int multiplyNumbers(int n) {
    if (n>=1)
        return n*multiplyNumbers(n-1);
    else
        return 1;
}",
    ),
    (
        "logic",
        "You are on an island where some people always tell the truth and some always lie. \
You meet two islanders:

Alice says, “Bob is a liar.”
Bob says, “We are both truth-tellers.”

Who is telling the truth?",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VibeEntry {
    pub key: &'static str,
    pub prompt: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiAction {
    pub name: String,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VibeMenu {
    entries: Vec<VibeEntry>,
}

impl VibeMenu {
    pub fn builtin() -> Self {
        Self {
            entries: VIBE_CHECKS
                .iter()
                .map(|&(key, prompt)| VibeEntry { key, prompt })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[VibeEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&VibeEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn actions(&self) -> Vec<UiAction> {
        self.entries
            .iter()
            .map(|entry| UiAction {
                name: entry.key.to_string(),
                label: entry.key.to_string(),
                value: entry.prompt.to_string(),
            })
            .collect()
    }
}
