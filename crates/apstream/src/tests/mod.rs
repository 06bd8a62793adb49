mod chunking;
mod splitter;
