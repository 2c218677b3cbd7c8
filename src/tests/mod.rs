
mod graph;
mod web;
