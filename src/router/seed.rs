//! Seed corpus
//!
//! Labeled utterances used to train a fresh classifier on first start, in
//! this fixed order. Ten per layer; changing the corpus changes
//! out-of-the-box routing, so treat edits as behavioral changes.

use crate::types::Layer;

pub const SEED_CORPUS: &[(&str, Layer)] = &[
    // Identity: explicit first-person attributes
    ("My name is Sarah", Layer::Identity),
    ("I am a vegetarian", Layer::Identity),
    ("Call me Max", Layer::Identity),
    ("I don't eat pork", Layer::Identity),
    ("I'm allergic to peanuts", Layer::Identity),
    ("My religion is Buddhism", Layer::Identity),
    ("My preferred language is Spanish", Layer::Identity),
    ("I am an early riser", Layer::Identity),
    ("My gender is female", Layer::Identity),
    ("Actually, my name is Jon, not John", Layer::Identity),
    // Experience: conversational events
    ("I had coffee with Sarah this morning", Layer::Experience),
    ("We went hiking last weekend", Layer::Experience),
    ("I watched a great movie yesterday", Layer::Experience),
    ("My meeting ran late today", Layer::Experience),
    ("I argued with my brother about politics", Layer::Experience),
    ("The project deadline stressed me out", Layer::Experience),
    ("I visited my grandmother on Sunday", Layer::Experience),
    ("We celebrated my promotion last night", Layer::Experience),
    ("I missed the bus this morning", Layer::Experience),
    ("Dinner with my friends was really fun", Layer::Experience),
    // Knowledge: capabilities and skills
    ("I know how to code in Python", Layer::Knowledge),
    ("I'm skilled in woodworking", Layer::Knowledge),
    ("I specialize in data analysis", Layer::Knowledge),
    ("I can play the guitar", Layer::Knowledge),
    ("I understand machine learning concepts", Layer::Knowledge),
    ("I know how to bake sourdough bread", Layer::Knowledge),
    ("I'm good at public speaking", Layer::Knowledge),
    ("I've mastered several chess openings", Layer::Knowledge),
    ("I know how to repair bicycles", Layer::Knowledge),
    ("I'm trained in first aid", Layer::Knowledge),
];
