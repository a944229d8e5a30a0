mod chebyshev;
mod operator;
