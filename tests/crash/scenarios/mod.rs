mod recovery;
mod rollover;
