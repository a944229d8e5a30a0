mod collectives;
mod failure;
